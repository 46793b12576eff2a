//! Routing Forms Command Line Interface
//!
//! Runs routing decisions, validation and router listings against a fixture
//! file of forms and teams.
//!
//! # Usage
//!
//! ```bash
//! # Decide where a submission goes
//! routing-forms decide --fixture forms.yaml --form sales-intake \
//!     --response response.json --query "utm_source=ads"
//!
//! # Same, with a per-route evaluation trace
//! routing-forms decide --fixture forms.yaml --form sales-intake --response response.json --explain
//!
//! # Validate every form in a fixture
//! routing-forms validate --fixture forms.yaml
//!
//! # List forms that could be added as routers
//! routing-forms routers --fixture forms.yaml --form partner-intake -o json
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use serde::Deserialize;
use tracing_subscriber::prelude::*;

use routing_forms_core::{
    eligible_routers, explain_condition, normalize_response, validate_attribute_queries,
    validate_form, Action, ChainResolver, DecisionRequest, EngineConfig, EvalContext, FieldValue,
    Fixture, Form, FormStore, ForwardParams, HostOutcome, ResponseEntry, RoutingDecision,
    RoutingEngine, RoutingError, TeamDirectory,
};

#[derive(Parser)]
#[command(name = "routing-forms")]
#[command(version)]
#[command(about = "Route form submissions with condition trees and router chains")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, short = 'o', global = true, default_value = "pretty", value_enum)]
    format: OutputFormat,

    /// Engine configuration file (YAML)
    #[arg(long, global = true, env = "ROUTING_FORMS_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
}

#[derive(Subcommand)]
enum Commands {
    /// Decide where a submission is routed
    Decide {
        /// Fixture file with forms and teams (YAML or JSON)
        #[arg(long)]
        fixture: PathBuf,

        /// Id of the submitted form
        #[arg(long)]
        form: String,

        /// Response file: a JSON object of field id to value, or a list of entries
        #[arg(long)]
        response: Option<PathBuf>,

        /// Incoming URL query string
        #[arg(long, default_value = "")]
        query: String,

        /// Print how each route of the form evaluated
        #[arg(long)]
        explain: bool,
    },

    /// Validate every form in a fixture
    Validate {
        #[arg(long)]
        fixture: PathBuf,
    },

    /// List forms that could be referenced as routers
    Routers {
        #[arg(long)]
        fixture: PathBuf,

        #[arg(long)]
        form: String,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ResponseFile {
    Entries(Vec<ResponseEntry>),
    Values(BTreeMap<String, FieldValue>),
}

impl ResponseFile {
    fn into_entries(self) -> Vec<ResponseEntry> {
        match self {
            Self::Entries(entries) => entries,
            Self::Values(values) => values
                .into_iter()
                .map(|(field_id, value)| ResponseEntry::new(field_id, value))
                .collect(),
        }
    }
}

// =============================================================================
// MAIN
// =============================================================================

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "routing_forms_core=info,routing_forms_cli=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let result = load_config(cli.config.as_deref()).and_then(|config| match cli.command {
        Commands::Decide {
            fixture,
            form,
            response,
            query,
            explain,
        } => cmd_decide(
            config,
            &fixture,
            &form,
            response.as_deref(),
            &query,
            explain,
            cli.format,
        ),
        Commands::Validate { fixture } => cmd_validate(&fixture, cli.format),
        Commands::Routers { fixture, form } => cmd_routers(&fixture, &form, cli.format),
    });

    match result {
        Ok(code) => code,
        Err(e) => {
            if cli.format == OutputFormat::Json {
                let routing = e.downcast_ref::<RoutingError>();
                println!(
                    "{}",
                    serde_json::json!({
                        "error": format!("{e:#}"),
                        "status": routing.map(RoutingError::http_status),
                        "configuration_error": routing.map(RoutingError::is_configuration_error),
                    })
                );
            } else {
                eprintln!("{}: {:#}", "error".red().bold(), e);
            }
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

fn load_fixture(path: &Path) -> Result<Fixture> {
    Fixture::from_file(path).with_context(|| format!("loading fixture {}", path.display()))
}

fn find_form<'a>(store: &'a dyn FormStore, form_id: &str) -> Result<&'a Form> {
    store
        .form(form_id)
        .with_context(|| format!("form {form_id} is not in the fixture"))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("JSON serialization failed")?
    );
    Ok(())
}

// =============================================================================
// COMMAND IMPLEMENTATIONS
// =============================================================================

fn cmd_decide(
    config: EngineConfig,
    fixture: &Path,
    form_id: &str,
    response: Option<&Path>,
    query: &str,
    explain: bool,
    format: OutputFormat,
) -> Result<ExitCode> {
    let (forms, teams) = load_fixture(fixture)?.into_parts();
    let form = find_form(&forms, form_id)?;

    let entries = match response {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading response {}", path.display()))?;
            serde_json::from_str::<ResponseFile>(&content)
                .with_context(|| format!("parsing response {}", path.display()))?
                .into_entries()
        }
        None => Vec::new(),
    };
    let url_params = ForwardParams::from_query(query);
    tracing::debug!(form_id, entries = entries.len(), params = url_params.len(), "Loaded submission");

    if explain && format == OutputFormat::Pretty {
        print_explain(form, &forms, &entries, config.case_sensitive_text)
            .with_context(|| format!("explaining routes of form {form_id}"))?;
    }

    let engine = RoutingEngine::new(config, &forms, &teams);
    let decision = engine
        .decide(DecisionRequest {
            form,
            entries: &entries,
            url_params: &url_params,
        })
        .with_context(|| format!("deciding route for form {form_id}"))?;

    match format {
        OutputFormat::Json => print_json(&decision)?,
        OutputFormat::Pretty => print_decision(&decision),
    }

    Ok(match decision.host_outcome() {
        HostOutcome::NoEligibleHost => ExitCode::from(2),
        HostOutcome::NotApplicable | HostOutcome::Eligible(_) => ExitCode::SUCCESS,
    })
}

fn print_decision(decision: &RoutingDecision) {
    println!(
        "{} {} routed by {} ({:?})",
        "OK".green().bold(),
        decision.route_id.bold(),
        decision.routed_by,
        decision.matched_by
    );
    match &decision.action {
        Action::EventRedirect { destination } => println!("  book event  {}", destination.cyan()),
        Action::ExternalRedirect { .. } => println!(
            "  redirect    {}",
            decision.redirect_url().unwrap_or_default().cyan()
        ),
        Action::CustomMessage { text } => println!("  message     {}", text.cyan()),
    }
    match decision.host_outcome() {
        HostOutcome::NotApplicable => {}
        HostOutcome::Eligible(ids) => {
            let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
            println!("  hosts       {}", ids.join(", ").green());
        }
        HostOutcome::NoEligibleHost => {
            println!("  hosts       {}", "no eligible host".red().bold());
        }
    }
    if !decision.forward_params.is_empty() {
        println!("  forward     {}", decision.forward_params.to_query_string());
    }
}

fn print_explain(
    form: &Form,
    forms: &dyn FormStore,
    entries: &[ResponseEntry],
    case_sensitive: bool,
) -> Result<()> {
    let fields = ChainResolver::new(forms).check_references(form)?.fields();
    let response = normalize_response(entries, &fields);
    let ctx = EvalContext::new(&form.fields, response.values()).case_sensitive(case_sensitive);

    println!("{} {}", "Routes of".dimmed(), form.id.bold());
    for route in form.routes.rule_routes() {
        let trace = explain_condition(&route.query, &ctx);
        let mark = if trace.matched {
            "match".green()
        } else {
            "miss".red()
        };
        let label = if route.is_fallback { " (fallback)" } else { "" };
        println!("  [{mark}] {}{label}", route.id);
        for (field, value) in &trace.facts {
            let shown = value
                .as_ref()
                .map(|v| v.to_strings().join(","))
                .unwrap_or_else(|| "-".into());
            println!("        {field} = {shown}");
        }
        for field in &trace.skipped {
            println!("        {} {field}", "skipped".yellow());
        }
    }
    for reference in form.routes.router_references() {
        println!("  [{}] {} (router)", "delegate".blue(), reference.id);
    }
    println!();
    Ok(())
}

fn cmd_validate(fixture: &Path, format: OutputFormat) -> Result<ExitCode> {
    let (forms, teams) = load_fixture(fixture)?.into_parts();

    let mut results = Vec::new();
    for form in forms.forms() {
        let outcome = validate_form(form, &forms).map(|mut report| {
            if let Some(attributes) = form.owner.team_id.and_then(|id| teams.team_attributes(id)) {
                report
                    .warnings
                    .extend(validate_attribute_queries(form, attributes));
            }
            report
        });
        results.push((form.id.as_str(), outcome));
    }
    let failed = results.iter().filter(|(_, r)| r.is_err()).count();

    match format {
        OutputFormat::Json => {
            let rows: Vec<serde_json::Value> = results
                .iter()
                .map(|(id, outcome)| match outcome {
                    Ok(report) => serde_json::json!({
                        "form_id": id,
                        "valid": true,
                        "warnings": report.warnings,
                    }),
                    Err(e) => serde_json::json!({
                        "form_id": id,
                        "valid": false,
                        "error": e.to_string(),
                        "status": e.http_status(),
                    }),
                })
                .collect();
            print_json(&rows)?;
        }
        OutputFormat::Pretty => {
            for (id, outcome) in &results {
                match outcome {
                    Ok(report) if report.is_clean() => println!("{} {id}", "OK".green()),
                    Ok(report) => {
                        println!("{} {id}", "WARN".yellow());
                        for w in &report.warnings {
                            println!("  {w}");
                        }
                    }
                    Err(e) => println!("{} {id}: {e}", "FAIL".red().bold()),
                }
            }
            println!();
            println!("{} form(s), {} failed", results.len(), failed);
        }
    }

    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn cmd_routers(fixture: &Path, form_id: &str, format: OutputFormat) -> Result<ExitCode> {
    let (forms, _) = load_fixture(fixture)?.into_parts();
    let form = find_form(&forms, form_id)?;
    let options = eligible_routers(form, &forms);

    match format {
        OutputFormat::Json => print_json(&options)?,
        OutputFormat::Pretty => {
            if options.is_empty() {
                println!("No sibling forms for {}", form_id.bold());
            }
            for option in &options {
                match option.disabled {
                    None => println!("  {} {}", option.id.green(), option.name),
                    Some(reason) => println!(
                        "  {} {} {}",
                        option.id.dimmed(),
                        option.name.dimmed(),
                        format!("({reason:?})").yellow()
                    ),
                }
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}
