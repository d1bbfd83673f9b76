use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::time::Instant;

mod annotate;
mod collect;
mod config;
mod document;
mod docx;
mod error;
mod model;
mod output;
mod report;
mod resolve;
mod xml;

use annotate::Annotator;
use collect::Collector;
use config::Config;
use docx::Docx;
use model::{Collection, ContainerKey};
use resolve::{Disposition, Resolution, Resolver};

/// citedup - Find near-duplicate citations in Word documents and renumber them
#[derive(Parser)]
#[command(name = "citedup")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true, default_value = ".citedup.toml")]
    config: PathBuf,

    /// Quiet mode - suppress status lines
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List every citation marker, grouped by paragraph and table cell
    Scan {
        /// Word document (.docx)
        document: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show duplicate clusters and the renumbering without writing anything
    Plan {
        /// Word document (.docx)
        document: PathBuf,

        /// Similarity threshold (0.0 to 1.0)
        #[arg(short, long)]
        threshold: Option<f64>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write the citation report and the annotated copy
    Run {
        /// Word document (.docx)
        document: PathBuf,

        /// Similarity threshold (0.0 to 1.0)
        #[arg(short, long)]
        threshold: Option<f64>,

        /// Annotated copy [default: <stem>_modified.docx]
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Markdown report [default: <stem>_citations.md]
        #[arg(short, long)]
        report: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match Config::load(&cli.config) {
        Ok(config) => dispatch(cli.command, config, cli.quiet),
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

fn dispatch(command: Commands, config: Config, quiet: bool) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Scan { document, json } => cmd_scan(&document, json, &config, quiet),
        Commands::Plan {
            document,
            threshold,
            json,
        } => cmd_plan(&document, threshold, json, config, quiet),
        Commands::Run {
            document,
            threshold,
            out,
            report,
        } => cmd_run(&document, threshold, out, report, config, quiet),
    }
}

fn scan(path: &Path, config: &Config, quiet: bool) -> Result<(Docx, Collection), Box<dyn std::error::Error>> {
    if !quiet {
        eprintln!("{} {}", "Scanning".cyan().bold(), path.display());
    }
    let start = Instant::now();
    let doc = Docx::open(path)?;
    let collection = Collector::new(config).collect(&doc)?;
    if !quiet {
        eprintln!(
            "Collection: {:?} ({} citations in {} containers)",
            start.elapsed(),
            collection.occurrences.len(),
            collection.containers.len()
        );
    }
    Ok((doc, collection))
}

fn resolve(collection: &Collection, config: &Config, quiet: bool) -> Resolution {
    let start = Instant::now();
    let resolver = Resolver::new(config.threshold);
    let resolution = resolver.resolve(&collection.occurrences);
    if !quiet {
        eprintln!(
            "Resolution: {:?} ({} references, threshold {:.2})",
            start.elapsed(),
            resolution.clusters.len(),
            resolver.threshold()
        );
    }
    resolution
}

fn cmd_scan(
    path: &Path,
    json: bool,
    config: &Config,
    quiet: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let (_, collection) = scan(path, config, quiet)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&collection)?);
        return Ok(());
    }

    if collection.containers.is_empty() {
        println!("{}", "No citations found.".yellow());
        return Ok(());
    }

    println!(
        "{} citations in {} containers\n",
        collection.occurrences.len().to_string().green().bold(),
        collection.containers.len()
    );
    for summary in &collection.containers {
        println!("{} {}", summary.key.to_string().cyan(), summary.excerpt.dimmed());
        for occ in collection.in_container(&summary.key) {
            println!("  {:>6}  {}", occ.marker().yellow(), occ.context_text);
        }
        for table in collection.table_refs_in(&summary.key) {
            println!("  {}", table.label().dimmed());
        }
        println!();
    }

    Ok(())
}

fn cmd_plan(
    path: &Path,
    threshold: Option<f64>,
    json: bool,
    config: Config,
    quiet: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = config.with_threshold(threshold)?;
    let (_, collection) = scan(path, &config, quiet)?;
    let resolution = resolve(&collection, &config, quiet);

    if json {
        let output = serde_json::json!({
            "threshold": config.threshold,
            "occurrences": collection.occurrences,
            "clusters": resolution.clusters,
            "mapping": resolution.mapping,
            "plan": resolution.plan(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if resolution.clusters.is_empty() {
        println!("{}", "No citations found.".yellow());
        return Ok(());
    }

    let duplicates = resolution.mapping.duplicates().count();
    println!(
        "{} references, {} duplicates (threshold: {}%)\n",
        resolution.clusters.len().to_string().green().bold(),
        duplicates.to_string().yellow().bold(),
        (config.threshold * 100.0).round() as u32
    );

    for cluster in &resolution.clusters {
        let rep = &collection.occurrences[cluster.representative()];
        println!(
            "{} {} {}",
            format!("[{}]", cluster.canonical_number).green().bold(),
            location(&rep.position.container).cyan(),
            rep.context_text
        );
        for &member in &cluster.members[1..] {
            let occ = &collection.occurrences[member];
            let similarity = match resolution.mapping.get(member).map(|e| e.disposition) {
                Some(Disposition::Duplicate { similarity, .. }) => similarity,
                _ => 1.0,
            };
            println!(
                "  {} {}% {} {}",
                "~".dimmed(),
                (similarity * 100.0).round() as u32,
                occ.marker().red(),
                location(&occ.position.container)
            );
        }
    }

    Ok(())
}

fn cmd_run(
    path: &Path,
    threshold: Option<f64>,
    out: Option<PathBuf>,
    report: Option<PathBuf>,
    config: Config,
    quiet: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let start = Instant::now();
    let config = config.with_threshold(threshold)?;

    let out = out.unwrap_or_else(|| output::sibling_path(path, &config.output_suffix, "docx"));
    let report_path =
        report.unwrap_or_else(|| output::sibling_path(path, &config.report_suffix, "md"));
    output::ensure_distinct(path, &out)?;
    output::ensure_distinct(path, &report_path)?;
    output::ensure_separate_outputs(&report_path, &out)?;

    let (mut doc, collection) = scan(path, &config, quiet)?;
    let resolution = resolve(&collection, &config, quiet);

    let source = doc
        .path()
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let markdown = report::render_report(&source, config.threshold, &collection, &resolution);

    let applied =
        Annotator::new(&config.colors).apply(&mut doc, &collection.occurrences, &resolution.plan())?;
    let bytes = doc.to_bytes()?;

    if !quiet {
        eprintln!("{} {}", "Writing".cyan().bold(), report_path.display());
    }
    output::write_atomic(&report_path, markdown.as_bytes())?;
    if !quiet {
        eprintln!("{} {}", "Writing".cyan().bold(), out.display());
    }
    output::write_atomic(&out, &bytes)?;

    let elapsed = start.elapsed();
    let duplicates = resolution.mapping.duplicates().count();

    if !quiet {
        println!();
        println!("{}", "Citation Summary".green().bold());
        println!("  Citations found:     {}", collection.occurrences.len().to_string().cyan());
        println!("  Distinct references: {}", resolution.clusters.len().to_string().cyan());
        println!("  Duplicates removed:  {}", duplicates.to_string().cyan());
        println!("  Markers annotated:   {}", applied.to_string().cyan());
        println!("  Time elapsed:        {:.2?}", elapsed);
        println!();
    }
    println!("{} {}", "Report written to".green(), report_path.display().to_string().cyan());
    println!("{} {}", "Annotated copy written to".green(), out.display().to_string().cyan());
    if !doc.is_modified() && !quiet {
        println!("{}", "No citations found; the copy is unchanged.".yellow());
    }

    Ok(())
}

fn location(key: &ContainerKey) -> String {
    format!("({})", key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docx::fixtures::{docx_bytes, para, part, run};
    use std::fs;

    fn write_fixture(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, docx_bytes(body)).unwrap();
        path
    }

    #[test]
    fn test_run_writes_report_and_copy_beside_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_fixture(
            dir.path(),
            "paper.docx",
            &format!(
                "{}{}",
                para(&run("Aspirin reduces stroke risk [3].")),
                para(&run("Aspirin reduces stroke risk [3]."))
            ),
        );

        cmd_run(&input, None, None, None, Config::default(), true).unwrap();

        let report = fs::read_to_string(dir.path().join("paper_citations.md")).unwrap();
        assert!(report.starts_with("# Citation Report: paper.docx"));
        assert!(report.contains("## Modification Plan"));
        assert!(report.contains("1. paragraph 1: [3] -> [1]"));
        assert!(report.contains("2. paragraph 2: strike [3] (duplicate of [1])"));

        let copy = fs::read(dir.path().join("paper_modified.docx")).unwrap();
        assert_ne!(copy, fs::read(&input).unwrap());
        let xml = part(&copy, crate::docx::DOCUMENT_PART);
        assert!(xml.contains(r#"<w:b/><w:color w:val="0070C0"/>"#));
    }

    #[test]
    fn test_run_copies_document_without_citations_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_fixture(dir.path(), "notes.docx", &para(&run("No references here.")));
        let out = dir.path().join("copy.docx");
        let report = dir.path().join("notes.md");

        cmd_run(
            &input,
            None,
            Some(out.clone()),
            Some(report.clone()),
            Config::default(),
            true,
        )
        .unwrap();

        assert_eq!(fs::read(&out).unwrap(), fs::read(&input).unwrap());
        assert!(fs::read_to_string(&report).unwrap().contains("**Citations found:** 0"));
    }

    #[test]
    fn test_run_rejects_clashing_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_fixture(dir.path(), "paper.docx", &para(&run("Cited [1].")));
        let shared = dir.path().join("x");

        let err = cmd_run(
            &input,
            None,
            Some(shared.clone()),
            Some(shared.clone()),
            Config::default(),
            true,
        )
        .unwrap_err();
        assert!(err.to_string().contains("would both be written"));
        assert!(!shared.exists());

        let err = cmd_run(&input, None, Some(input.clone()), None, Config::default(), true)
            .unwrap_err();
        assert!(err.to_string().contains("refusing to overwrite"));
        assert!(!dir.path().join("paper_citations.md").exists());
    }
}
