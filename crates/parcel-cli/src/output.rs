//! Terminal rendering of query outcomes and configuration

use std::fmt::Display;
use std::io;
use std::path::{Path, PathBuf};

use console::{Term, style};
use parcel_agent::{AnalysisOutcome, QueryOutcome, SearchOutcome, SessionContext};
use parcel_core::{Dataset, ParcelConfig};
use parcel_search::{EmbeddingProvider, record_text};

/// Banner shown when the interactive session starts.
pub fn render_banner<E: EmbeddingProvider>(session: &SessionContext<E>) -> io::Result<()> {
    let term = Term::stdout();
    term.write_line(&format!("{}", style("Parcel property assistant").cyan().bold()))?;
    term.write_line(&format!(
        "{}",
        style(format!(
            "{} records loaded, search {}. Type 'exit' to quit.",
            session.dataset.len(),
            if session.index.is_available() {
                "enabled"
            } else {
                "disabled"
            }
        ))
        .dim()
    ))
}

/// Prompt for the next query.
pub fn render_prompt() -> io::Result<()> {
    Term::stdout().write_str(&format!("{} ", style("parcel>").green().bold()))
}

/// Print an error without ending the session.
pub fn render_error(error: &impl Display) -> io::Result<()> {
    Term::stderr().write_line(&format!("{} {error}", style("Error:").red().bold()))
}

/// Print the interpretation followed by search results or analysis output.
///
/// # Errors
/// Returns an error if the interpretation cannot be serialized or stdout
/// cannot be written.
pub fn render_outcome<E>(session: &SessionContext<E>, outcome: &QueryOutcome) -> anyhow::Result<()> {
    let term = Term::stdout();

    term.write_line(&format!("{}", style("Query Interpretation").cyan().bold()))?;
    term.write_line(&serde_json::to_string_pretty(outcome.interpretation())?)?;
    term.write_line("")?;

    let body = match outcome {
        QueryOutcome::Search(search) => format_search(
            &session.dataset,
            &session.config.embedding.text_columns,
            search,
        ),
        QueryOutcome::Analysis(analysis) => format_analysis(analysis),
    };
    term.write_line(&body)?;
    Ok(())
}

/// Numbered list of matching records with their similarity scores.
fn format_search(dataset: &Dataset, columns: &[String], outcome: &SearchOutcome) -> String {
    let mut lines = vec![format!("{}", style("Search Results").cyan().bold())];
    if outcome.records.is_empty() {
        lines.push("No matching properties found.".to_owned());
        return lines.join("\n");
    }

    for (rank, (index, score)) in outcome.records.iter().zip(&outcome.scores).enumerate() {
        let summary = dataset
            .record(*index)
            .map(|record| record_text(&record, columns))
            .unwrap_or_default();
        lines.push(format!(
            "{:>2}. {}  {}",
            rank + 1,
            summary.trim(),
            style(format!("(score {score:.3})")).dim()
        ));
    }
    lines.join("\n")
}

fn format_analysis(outcome: &AnalysisOutcome) -> String {
    format_analysis_parts(
        &outcome.narrative,
        outcome.plot_path.as_deref(),
        &outcome.result.plot_files,
    )
}

fn format_analysis_parts(narrative: &str, chart: Option<&Path>, plot_files: &[PathBuf]) -> String {
    let mut lines = vec![format!("{}", style("Analysis Result").cyan().bold())];

    let narrative = narrative.trim_end();
    if narrative.is_empty() {
        lines.push(format!("{}", style("(the script printed nothing)").dim()));
    } else {
        lines.push(narrative.to_owned());
    }

    if let Some(chart) = chart {
        lines.push(format!("{} {}", style("Chart:").green(), chart.display()));
    }
    let extra: Vec<_> = plot_files
        .iter()
        .filter(|path| Some(path.as_path()) != chart)
        .collect();
    if !extra.is_empty() {
        lines.push(format!("{}", style("Other charts:").green()));
        lines.extend(extra.iter().map(|path| format!("  {}", path.display())));
    }

    lines.join("\n")
}

/// Print serialized configuration.
pub fn render_toml(content: &str) -> io::Result<()> {
    Term::stdout().write_line(content.trim_end())
}

/// Print the settings most often checked when something is misconfigured.
pub fn render_config_summary(config: &ParcelConfig, path: Option<&Path>) -> io::Result<()> {
    Term::stdout().write_line(&format_config_summary(config, path))
}

fn format_config_summary(config: &ParcelConfig, path: Option<&Path>) -> String {
    let api_key = if config.api_key().is_some() {
        "set"
    } else {
        "not set"
    };
    let source = path.map_or_else(|| "defaults".to_owned(), |file| file.display().to_string());

    [
        format!("{}", style("Parcel Configuration").cyan().bold()),
        format!("  Config file:  {source}"),
        format!("  Model:        {}", config.provider.model),
        format!("  API key:      {api_key}"),
        format!("  Dataset:      {}", config.dataset.path.display()),
        format!(
            "  Embeddings:   {} ({})",
            config.embedding.backend, config.embedding.model
        ),
        format!("  Interpreter:  {}", config.analysis.interpreter),
        format!("  Work dir:     {}", config.analysis.work_dir.display()),
        format!("  Chart:        {}", config.analysis.plot_path().display()),
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use parcel_core::{Intent, QueryInterpretation};

    const RECORDS: &str = r#"[
        {"address": "1 Baker Street", "town": "London"},
        {"address": "5 Mill Lane", "town": "Bristol"}
    ]"#;

    fn plain(text: &str) -> String {
        console::strip_ansi_codes(text).into_owned()
    }

    #[test]
    fn search_results_are_numbered_best_first() {
        let dataset = Dataset::from_json_records(RECORDS).unwrap();
        let outcome = SearchOutcome {
            interpretation: QueryInterpretation::new(Intent::Search, Default::default()),
            records: vec![1, 0],
            scores: vec![0.9, 0.25],
        };
        let columns = vec!["address".to_owned(), "town".to_owned()];

        let rendered = plain(&format_search(&dataset, &columns, &outcome));
        let lines: Vec<_> = rendered.lines().collect();
        assert_eq!(lines[1], " 1. 5 Mill Lane Bristol  (score 0.900)");
        assert_eq!(lines[2], " 2. 1 Baker Street London  (score 0.250)");
    }

    #[test]
    fn empty_search_says_so() {
        let dataset = Dataset::from_json_records(RECORDS).unwrap();
        let outcome = SearchOutcome {
            interpretation: QueryInterpretation::new(Intent::Search, Default::default()),
            records: Vec::new(),
            scores: Vec::new(),
        };
        let rendered = plain(&format_search(&dataset, &[], &outcome));
        assert!(rendered.ends_with("No matching properties found."));
    }

    #[test]
    fn analysis_shows_narrative_and_chart() {
        let chart = PathBuf::from("/work/graphs/result.png");
        let files = vec![chart.clone(), PathBuf::from("/work/graphs/extra.png")];

        let rendered = plain(&format_analysis_parts(
            "Median price rose 4%\n",
            Some(&chart),
            &files,
        ));
        assert!(rendered.contains("Median price rose 4%\nChart: /work/graphs/result.png"));
        assert!(rendered.ends_with("Other charts:\n  /work/graphs/extra.png"));
    }

    #[test]
    fn silent_script_is_called_out() {
        let rendered = plain(&format_analysis_parts("", None, &[]));
        assert_eq!(rendered, "Analysis Result\n(the script printed nothing)");
    }

    #[test]
    fn config_summary_never_prints_the_key() {
        let mut config = ParcelConfig::default();
        config.provider.api_key = Some("secret-key".to_owned());

        let rendered = plain(&format_config_summary(&config, None));
        assert!(rendered.contains("API key:      set"));
        assert!(rendered.contains("Config file:  defaults"));
        assert!(!rendered.contains("secret-key"));
    }
}
