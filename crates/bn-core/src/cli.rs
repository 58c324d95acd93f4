//! `bnet` command line.
//!
//! Every command reads a network document (see [`crate::network`]) and
//! prints either JSON or a plain table on stdout. Failures are reported on
//! stderr and mapped to an [`ExitCode`].

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::json;
use tracing::{debug, info};

use bn_common::{Error, NodeId, Result, SCHEMA_VERSION};
use bn_config::{resolve_config, EngineConfig};

use crate::data::{DiscreteData, DiscreteDataSet};
use crate::estimate::{em_estimate, ml_estimate};
use crate::evidence::Evidence;
use crate::exit_codes::ExitCode;
use crate::im::BayesIm;
use crate::logging::LogFormat;
use crate::network::NetworkFile;
use crate::random::SeededRandom;
use crate::score::BdeMetricCache;
use crate::updater::{BayesUpdater, InvariantUpdater};

#[derive(Parser, Debug)]
#[command(name = "bnet")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Discrete Bayes-net simulation, exact updating and BDe scoring")]
pub struct Cli {
    /// Engine config file (falls back to BNET_CONFIG, then defaults)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Log line format on stderr
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Forward-sample cases from a network
    Simulate(SimulateArgs),
    /// Posterior marginals under evidence and interventions
    Marginals(MarginalsArgs),
    /// BDe score of every family of a network against a data set
    Score(ScoreArgs),
    /// Estimate CPTs for a network's structure from data
    Estimate(EstimateArgs),
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Network document
    #[arg(long, value_name = "PATH")]
    pub network: PathBuf,
    /// Number of cases
    #[arg(long, default_value = "100")]
    pub samples: usize,
    /// Seed (overrides the config seed)
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Args, Debug)]
pub struct MarginalsArgs {
    #[arg(long, value_name = "PATH")]
    pub network: PathBuf,
    /// Observation, repeatable; CAT is a label or an index
    #[arg(long = "evidence", value_name = "NAME=CAT")]
    pub evidence: Vec<String>,
    /// Intervene on a node, cutting its incoming edges; repeatable
    #[arg(long = "manipulate", value_name = "NAME")]
    pub manipulate: Vec<String>,
    /// Only report these nodes
    #[arg(long = "node", value_name = "NAME")]
    pub nodes: Vec<String>,
    /// Report prior marginals next to the updated ones
    #[arg(long)]
    pub prior: bool,
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Args, Debug)]
pub struct ScoreArgs {
    #[arg(long, value_name = "PATH")]
    pub network: PathBuf,
    /// Data set JSON
    #[arg(long, value_name = "PATH")]
    pub data: PathBuf,
    /// Use the network's CPTs to fill in incomplete cases
    #[arg(long)]
    pub use_model: bool,
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EstimateMethod {
    /// Complete-case maximum likelihood
    Ml,
    /// Expectation-maximization over incomplete cases and latent nodes
    Em,
}

#[derive(Args, Debug)]
pub struct EstimateArgs {
    #[arg(long, value_name = "PATH")]
    pub network: PathBuf,
    #[arg(long, value_name = "PATH")]
    pub data: PathBuf,
    #[arg(long, value_enum, default_value_t = EstimateMethod::Ml)]
    pub method: EstimateMethod,
    /// Added to every count before normalizing (ml only)
    #[arg(long, default_value = "0.0")]
    pub pseudo_count: f64,
    /// Parameter change at which EM stops (em only)
    #[arg(long, default_value = "0.0001")]
    pub threshold: f64,
    /// Seed for the random start of EM (overrides the config seed)
    #[arg(long)]
    pub seed: Option<u64>,
}

/// Run a parsed command line.
pub fn run(cli: &Cli) -> ExitCode {
    match execute(cli) {
        Ok(()) => ExitCode::Clean,
        Err(err) => {
            let code = ExitCode::from(&err);
            match cli.format {
                OutputFormat::Json => eprintln!(
                    "{}",
                    json!({ "error": err.to_string(), "code": err.code() })
                ),
                OutputFormat::Table => eprintln!("error: {err}"),
            }
            code
        }
    }
}

fn execute(cli: &Cli) -> Result<()> {
    let (config, source) = resolve_config(cli.config.as_deref())?;
    debug!(?source, "resolved config");
    match &cli.command {
        Commands::Simulate(args) => run_simulate(cli.format, &config, args),
        Commands::Marginals(args) => run_marginals(cli.format, &config, args),
        Commands::Score(args) => run_score(cli.format, &config, args),
        Commands::Estimate(args) => run_estimate(cli.format, &config, args),
    }
}

fn load_model(config: &EngineConfig, path: &Path, seed: Option<u64>) -> Result<(BayesIm, SeededRandom)> {
    let mut rng = match seed {
        Some(seed) => SeededRandom::new(seed),
        None => SeededRandom::from_config(&config.random),
    };
    let im = NetworkFile::from_file(path)?.to_model(config.categories, &mut rng)?;
    info!(nodes = im.num_nodes(), path = %path.display(), "loaded network");
    Ok((im, rng))
}

fn load_data(path: &Path) -> Result<DiscreteDataSet> {
    let content = std::fs::read_to_string(path)?;
    let data: DiscreteDataSet = serde_json::from_str(&content)?;
    data.validate()?;
    info!(rows = data.num_rows(), columns = data.num_columns(), "loaded data");
    Ok(data)
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ── simulate ────────────────────────────────────────────────────────────

fn run_simulate(format: OutputFormat, config: &EngineConfig, args: &SimulateArgs) -> Result<()> {
    let (im, mut rng) = load_model(config, &args.network, args.seed)?;
    let data = im.simulate_data(args.samples, &mut rng)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&data)?),
        OutputFormat::Table => {
            let names: Vec<&str> = data.variables().iter().map(|v| v.name()).collect();
            println!("{}", names.join("\t"));
            for row in 0..data.num_rows() {
                let labels: Vec<&str> = data
                    .variables()
                    .iter()
                    .enumerate()
                    .map(|(col, v)| v.category(data.get_int(row, col) as usize).unwrap_or("?"))
                    .collect();
                println!("{}", labels.join("\t"));
            }
        }
    }
    Ok(())
}

// ── marginals ───────────────────────────────────────────────────────────

/// Build evidence from `NAME=CAT` observations and manipulated names.
pub fn parse_evidence(im: &BayesIm, observations: &[String], manipulated: &[String]) -> Result<Evidence> {
    let mut evidence = Evidence::tautology(im);
    for item in observations {
        let (name, category) = item
            .split_once('=')
            .ok_or_else(|| Error::Config(format!("evidence '{item}' is not NAME=CAT")))?;
        let node = im.dag().require(name.trim())?;
        let category = category.trim();
        let index = im
            .pm()
            .category_index(node, category)
            .or_else(|| category.parse::<usize>().ok())
            .ok_or_else(|| {
                Error::Config(format!("{category} is not a category of {}", name.trim()))
            })?;
        evidence.set_category(node, index)?;
    }
    for name in manipulated {
        let node = im.dag().require(name.trim())?;
        evidence.set_manipulated(node, true)?;
    }
    Ok(evidence)
}

fn run_marginals(format: OutputFormat, config: &EngineConfig, args: &MarginalsArgs) -> Result<()> {
    let (im, _) = load_model(config, &args.network, args.seed)?;
    let evidence = parse_evidence(&im, &args.evidence, &args.manipulate)?;
    let nodes: Vec<NodeId> = if args.nodes.is_empty() {
        im.nodes().collect()
    } else {
        args.nodes
            .iter()
            .map(|n| im.dag().require(n))
            .collect::<Result<_>>()?
    };

    let mut updater = InvariantUpdater::with_config(&im, config.inference.clone())?;
    updater.set_evidence(evidence)?;

    let mut rows = Vec::with_capacity(nodes.len());
    for node in nodes {
        let updated = updater.calculate_updated_marginals(node)?;
        let prior = if args.prior {
            Some(updater.calculate_prior_marginals(node)?)
        } else {
            None
        };
        rows.push((node, updated, prior));
    }

    match format {
        OutputFormat::Json => {
            let marginals: Vec<_> = rows
                .iter()
                .map(|(node, updated, prior)| {
                    json!({
                        "node": im.pm().name(*node),
                        "categories": im.pm().variable(*node).categories(),
                        "marginal": updated,
                        "prior": prior,
                    })
                })
                .collect();
            print_json(&json!({
                "schema_version": SCHEMA_VERSION,
                "probability_of_evidence": updater.probability_of_evidence(),
                "stats": updater.stats(),
                "marginals": marginals,
            }))?;
        }
        OutputFormat::Table => {
            for (node, updated, prior) in &rows {
                for (c, p) in updated.iter().enumerate() {
                    let label = im.pm().category(*node, c).unwrap_or("?");
                    match prior {
                        Some(prior) => println!(
                            "{}\t{}\t{:.6}\t(prior {:.6})",
                            im.pm().name(*node),
                            label,
                            p,
                            prior[c]
                        ),
                        None => println!("{}\t{}\t{:.6}", im.pm().name(*node), label, p),
                    }
                }
            }
        }
    }
    Ok(())
}

// ── score ───────────────────────────────────────────────────────────────

fn run_score(format: OutputFormat, config: &EngineConfig, args: &ScoreArgs) -> Result<()> {
    let (im, _) = load_model(config, &args.network, args.seed)?;
    let data = load_data(&args.data)?;
    let pm = im.pm().clone();
    let mut cache = BdeMetricCache::with_config(
        &data,
        pm.clone(),
        config.scoring.clone(),
        config.inference.clone(),
    );

    let companion = args.use_model.then_some(&im);
    let mut families = Vec::with_capacity(pm.num_nodes());
    let mut total = 0.0;
    for node in pm.nodes() {
        let parents = pm.dag().parents(node).to_vec();
        let score = cache.score(node, &parents, &pm, companion)?;
        total += score;
        families.push((node, parents, score));
    }

    match format {
        OutputFormat::Json => {
            let rows: Vec<_> = families
                .iter()
                .map(|(node, parents, score)| {
                    json!({
                        "node": pm.name(*node),
                        "parents": parents.iter().map(|p| pm.name(*p)).collect::<Vec<_>>(),
                        "score": score,
                    })
                })
                .collect();
            print_json(&json!({
                "schema_version": SCHEMA_VERSION,
                "total": total,
                "families": rows,
                "cache": cache.stats(),
            }))?;
        }
        OutputFormat::Table => {
            for (node, parents, score) in &families {
                let names: Vec<&str> = parents.iter().map(|p| pm.name(*p)).collect();
                println!("{}\t{{{}}}\t{:.6}", pm.name(*node), names.join(", "), score);
            }
            println!("total\t\t{total:.6}");
        }
    }
    Ok(())
}

// ── estimate ────────────────────────────────────────────────────────────

fn run_estimate(format: OutputFormat, config: &EngineConfig, args: &EstimateArgs) -> Result<()> {
    let (im, mut rng) = load_model(config, &args.network, args.seed)?;
    let data = load_data(&args.data)?;
    let estimated = match args.method {
        EstimateMethod::Ml => ml_estimate(im.pm().clone(), &data, args.pseudo_count)?,
        EstimateMethod::Em => em_estimate(im.pm().clone(), &data, args.threshold, &mut rng)?,
    };
    info!(method = ?args.method, nodes = estimated.num_nodes(), "estimated parameters");
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&NetworkFile::from_model(&estimated))?)
        }
        OutputFormat::Table => {
            for node in estimated.nodes() {
                println!("{}", estimated.pm().name(node));
                for row in 0..estimated.num_rows(node) {
                    let cells: Vec<String> = estimated
                        .table(node)
                        .row(row)
                        .iter()
                        .map(|p| format!("{p:.6}"))
                        .collect();
                    println!("  {row}\t{}", cells.join("\t"));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Dag;
    use crate::pm::BayesPm;

    fn model() -> BayesIm {
        let dag = Dag::from_edges(&["A", "B"], &[("A", "B")]).unwrap();
        let mut pm = BayesPm::with_fixed_categories(dag, 2).unwrap();
        pm.set_categories(NodeId(0), vec!["off".into(), "on".into()]).unwrap();
        BayesIm::random(pm, &mut SeededRandom::new(1)).unwrap()
    }

    #[test]
    fn evidence_by_label_or_index() {
        let im = model();
        let e = parse_evidence(&im, &["A=on".into(), "B=0".into()], &["B".into()]).unwrap();
        assert_eq!(e.category(NodeId(0)), Some(1));
        assert_eq!(e.category(NodeId(1)), Some(0));
        assert!(e.is_manipulated(NodeId(1)));
    }

    #[test]
    fn evidence_errors() {
        let im = model();
        assert!(parse_evidence(&im, &["A".into()], &[]).is_err());
        assert!(matches!(
            parse_evidence(&im, &["Z=1".into()], &[]),
            Err(Error::UnknownNode(_))
        ));
        assert!(parse_evidence(&im, &["A=maybe".into()], &[]).is_err());
        assert!(parse_evidence(&im, &["A=5".into()], &[]).is_err());
    }

    #[test]
    fn cli_parses() {
        let cli = Cli::try_parse_from([
            "bnet",
            "--format",
            "table",
            "marginals",
            "--network",
            "net.json",
            "--evidence",
            "A=1",
            "--manipulate",
            "B",
            "--prior",
        ])
        .unwrap();
        assert_eq!(cli.format, OutputFormat::Table);
        match cli.command {
            Commands::Marginals(args) => {
                assert_eq!(args.evidence, vec!["A=1".to_string()]);
                assert!(args.prior);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn estimate_method_defaults_to_ml() {
        let cli = Cli::try_parse_from(["bnet", "estimate", "--network", "n.json", "--data", "d.json"])
            .unwrap();
        match cli.command {
            Commands::Estimate(args) => {
                assert_eq!(args.method, EstimateMethod::Ml);
                assert_eq!(args.threshold, 1e-4);
            }
            other => panic!("unexpected command {other:?}"),
        }
        let cli = Cli::try_parse_from([
            "bnet", "estimate", "--network", "n.json", "--data", "d.json", "--method", "em",
            "--threshold", "0.001",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Estimate(EstimateArgs { method: EstimateMethod::Em, .. })
        ));
    }
}
