//! Prompt templates sent to the language model.

use std::path::Path;

use parcel_core::{AnalysisConfig, Dataset, Parameters};

use crate::bedrooms;

/// First line of every interpretation prompt.
pub const INTERPRETATION_HEADER: &str =
    "Interpret the following user query about property search or analysis:";

/// First line of every analysis prompt.
pub const ANALYSIS_HEADER: &str = "Generate Python code to analyze the following data:";

/// System instruction for interpretation.
pub const INTERPRETATION_SYSTEM: &str =
    "You classify property queries and extract parameters. Reply with one JSON object only.";

/// System instruction for analysis code generation.
pub const ANALYSIS_SYSTEM: &str =
    "You write complete, runnable Python analysis scripts. Reply with code only.";

/// Prompt asking the model to classify `query` and extract its parameters.
pub fn interpretation_prompt(query: &str) -> String {
    format!(
        r#"{INTERPRETATION_HEADER}
"{query}"

Provide a JSON response with the following structure:
{{
    "intent": "search" or "analysis",
    "parameters": {{ extracted parameters, including "bedrooms" if BHK or RK is mentioned }}
}}

Use "search" when the user wants to find or list properties, and "analysis" when
they want statistics, trends, comparisons or charts.

Interpret BHK (Bedroom, Hall, Kitchen) and RK (Room, Kitchen) as follows:
{table}
Ensure that your response is a valid JSON object and nothing else."#,
        table = bedrooms::shorthand_table(),
    )
}

/// Prompt asking the model for a script that answers `query` over `dataset`.
///
/// The script must reload the data itself from `reload_path`, print its
/// findings, and overwrite the single chart at the fixed plot path.
pub fn analysis_prompt(
    query: &str,
    parameters: &Parameters,
    dataset: &Dataset,
    reload_path: &Path,
    config: &AnalysisConfig,
) -> String {
    let sample = dataset.sample_json(config.sample_rows);
    let columns = dataset.column_names().join(", ");
    let parameters = serde_json::to_string(parameters).unwrap_or_else(|_| "{}".to_owned());
    let plot_path = config.relative_plot_path();
    let reload_path = reload_path.display();
    let date_format = &config.date_format;
    let plot_dir = &config.plot_dir;

    format!(
        r#"{ANALYSIS_HEADER}
{sample}

The code should perform the analysis based on the query: "{query}"
Parameters extracted from the query: {parameters}

Requirements:
- Include every import the script needs.
- Load the full data yourself from the JSON export at '{reload_path}':
  import json
  with open(r'{reload_path}') as handle:
      df = pd.json_normalize(json.load(handle))
  Nested fields become dotted column names, as in the list below.
- Date and time columns use the format {date_format}. To work with years, extract
  them like this:
  df['latest_sale_year'] = pd.to_datetime(df['latest_sale_date'], format='{date_format}').dt.year
- Use print statements to output the relevant analysis results and insights.
- Save exactly one chart with plt.savefig('{plot_path}'), overwriting it if it
  already exists. Create the '{plot_dir}' directory if it is missing.
- Do not call plt.show().

The dataset has these columns:
{columns}"#
    )
}
