use anyhow::{Context, Result};
use bibfill::config::LookupConfig;
use bibfill::{complete_bibliography, reformat_only, Bibliography, CrossrefClient, MetadataResolver};
use clap::Parser;
use log::info;
use std::fs;
use std::path::PathBuf;

/// CLI app for completing and reformatting BibTeX files
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input .bib file
    #[arg(short, long, default_value = "input.bib")]
    input: PathBuf,
    /// Output .bib file
    #[arg(short, long, default_value = "output.bib")]
    output: PathBuf,
    /// Only reformat, skip all metadata lookups
    #[arg(long)]
    no_lookup: bool,
    /// Maximum number of concurrent lookups
    #[arg(long)]
    concurrency: Option<usize>,
    /// Contact email sent to Crossref
    #[arg(long)]
    mailto: Option<String>,
    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Configure logging
    if args.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    let content = fs::read_to_string(&args.input)
        .with_context(|| format!("Failed to read input from {:?}", args.input))?;
    let mut bibliography = Bibliography::parse(&content);
    info!("Parsed {} entries from {:?}", bibliography.len(), args.input);

    let report = if args.no_lookup {
        reformat_only(&mut bibliography)
    } else {
        let mut config = LookupConfig::from_env();
        if let Some(concurrency) = args.concurrency {
            config.concurrency = concurrency;
        }
        if args.mailto.is_some() {
            config.mailto = args.mailto.clone();
        }
        let (concurrency, rows) = (config.concurrency, config.rows);
        let client = CrossrefClient::new(config).context("Failed to build HTTP client")?;
        let resolver = MetadataResolver::with_rows(client, rows);
        complete_bibliography(&mut bibliography, &resolver, concurrency).await
    };
    info!("{}", report.summary());

    fs::write(&args.output, bibliography.render())
        .with_context(|| format!("Failed to write output to {:?}", args.output))?;
    info!("Output written to {:?}", args.output);

    Ok(())
}
