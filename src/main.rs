use std::io::Read;

use clap::Parser;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing_subscriber::EnvFilter;

use chapter_lens::{analyze, AnalysisConfig, Chapter, Section};

#[derive(Parser)]
#[command(
    name = "chapter-lens",
    about = "Evaluate educational prose against learning-science principles",
    version
)]
struct Cli {
    /// File paths to analyze (reads stdin if none provided)
    files: Vec<String>,
    /// Domain key for extra pattern detectors (e.g. chemistry)
    #[arg(long)]
    domain: Option<String>,
    /// Concept extraction threshold in (0, 1]
    #[arg(long, default_value_t = 0.3)]
    threshold: f64,
    /// Skip the visualization data block
    #[arg(long)]
    no_visualization: bool,
    /// Emit every recommendation instead of the top few
    #[arg(long)]
    detailed: bool,
}

static MD_HEADING_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^(#{1,6})\s+(.+)$").unwrap());

/// Split markdown text on headings. The engine itself never splits sections;
/// this is the thin preprocessing step the caller owes it.
fn sections_from_markdown(content: &str) -> Vec<Section> {
    let headings: Vec<(usize, usize, u8, String)> = MD_HEADING_RE
        .captures_iter(content)
        .map(|caps| {
            let whole = caps.get(0).unwrap();
            let level = caps.get(1).unwrap().as_str().len() as u8;
            let title = caps.get(2).unwrap().as_str().trim().to_string();
            (whole.start(), whole.end(), level, title)
        })
        .collect();

    if headings.is_empty() {
        return vec![Section {
            heading_level: 1,
            title: String::new(),
            start: 0,
            end: content.len(),
            text: content.to_string(),
        }];
    }

    let mut sections = Vec::with_capacity(headings.len() + 1);
    if headings[0].0 > 0 {
        sections.push(Section {
            heading_level: 1,
            title: String::new(),
            start: 0,
            end: headings[0].0,
            text: content[..headings[0].0].to_string(),
        });
    }
    for (i, (start, _, level, title)) in headings.iter().enumerate() {
        let end = headings
            .get(i + 1)
            .map(|next| next.0)
            .unwrap_or(content.len());
        sections.push(Section {
            heading_level: *level,
            title: title.clone(),
            start: *start,
            end,
            text: content[*start..end].to_string(),
        });
    }
    sections
}

fn run(name: &str, content: &str, cli: &Cli) {
    let sections = sections_from_markdown(content);
    let mut chapter = Chapter::new(name, name, content, sections);
    chapter.domain = cli.domain.clone();

    let config = AnalysisConfig {
        domain: cli.domain.clone(),
        enable_visualization: !cli.no_visualization,
        concept_extraction_threshold: cli.threshold,
        detailed_report: cli.detailed,
        ..AnalysisConfig::default()
    };

    match analyze(&chapter, &config) {
        Ok(result) => match serde_json::to_string_pretty(&result) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error serializing result for {name}: {e}");
                std::process::exit(1);
            }
        },
        Err(e) => {
            eprintln!("Error analyzing {name}: {e}");
            std::process::exit(1);
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if cli.files.is_empty() {
        let mut input = String::new();
        if let Err(e) = std::io::stdin().read_to_string(&mut input) {
            eprintln!("Failed to read stdin: {e}");
            std::process::exit(1);
        }
        run("stdin", &input, &cli);
    } else {
        for path in &cli.files {
            let text = std::fs::read_to_string(path).unwrap_or_else(|e| {
                eprintln!("Error reading {path}: {e}");
                std::process::exit(1);
            });
            run(path, &text, &cli);
        }
    }
}
