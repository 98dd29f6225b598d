//! Chan structural analysis runner.
//!
//! Loads bars from CSV, aggregates them into the configured timeframes,
//! analyzes every timeframe in parallel, scores each one and prints a JSON
//! report with cross-timeframe resonances.
//!
//! Usage: chan <csv_path> [--config PATH] [--timeframes 1d,1w,1M] [--tolerance SECS]
//!             [--validate DATE] [--horizon N] [--full] [--compact]

use std::env;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use chan_config::Config;
use chan_core::{Bar, Timeframe};
use chan_data::{parse_datetime, CsvLoader, DataSource};
use chan_ta::{
    AccuracyEvaluator, AccuracyReport, AnalysisResult, Analyzer, MultiTimeframeCoordinator,
    QualityScore, QualityScorer, Resonance, TimeframeDataBuilder,
};
use serde::Serialize;

/// Command-line options.
#[derive(Debug, Default)]
struct Options {
    csv_path: Option<PathBuf>,
    config_path: Option<PathBuf>,
    timeframes: Option<Vec<String>>,
    tolerance_secs: Option<f64>,
    validation_date: Option<f64>,
    horizon: Option<usize>,
    full: bool,
    compact: bool,
}

impl Options {
    fn parse(args: &[String]) -> Result<Self> {
        let mut options = Options::default();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--config" if i + 1 < args.len() => {
                    options.config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 2;
                }
                "--timeframes" if i + 1 < args.len() => {
                    options.timeframes =
                        Some(args[i + 1].split(',').map(|s| s.trim().to_string()).collect());
                    i += 2;
                }
                "--tolerance" if i + 1 < args.len() => {
                    let value = args[i + 1]
                        .parse()
                        .with_context(|| format!("invalid --tolerance '{}'", args[i + 1]))?;
                    options.tolerance_secs = Some(value);
                    i += 2;
                }
                "--validate" if i + 1 < args.len() => {
                    let Some(date) = parse_datetime(&args[i + 1]) else {
                        bail!("invalid --validate date '{}'", args[i + 1]);
                    };
                    options.validation_date = Some(date);
                    i += 2;
                }
                "--horizon" if i + 1 < args.len() => {
                    let value = args[i + 1]
                        .parse()
                        .with_context(|| format!("invalid --horizon '{}'", args[i + 1]))?;
                    options.horizon = Some(value);
                    i += 2;
                }
                "--full" => {
                    options.full = true;
                    i += 1;
                }
                "--compact" => {
                    options.compact = true;
                    i += 1;
                }
                arg if !arg.starts_with("--") && options.csv_path.is_none() => {
                    options.csv_path = Some(PathBuf::from(arg));
                    i += 1;
                }
                arg => {
                    log::warn!("ignoring argument '{arg}'");
                    i += 1;
                }
            }
        }

        Ok(options)
    }
}

/// Report for one timeframe.
#[derive(Debug, Serialize)]
struct TimeframeReport {
    timeframe: Timeframe,
    bars: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<Summary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    quality: Option<QualityScore>,
    #[serde(skip_serializing_if = "Option::is_none")]
    accuracy: Option<AccuracyReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    accuracy_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    analysis: Option<AnalysisResult>,
}

/// Structure counts of one analysis.
#[derive(Debug, Serialize)]
struct Summary {
    candles: usize,
    excluded_bars: usize,
    fractals: usize,
    strokes: usize,
    segments: usize,
    stroke_pivots: usize,
    segment_pivots: usize,
    divergences: usize,
}

impl Summary {
    fn of(result: &AnalysisResult) -> Self {
        Self {
            candles: result.series.len(),
            excluded_bars: result.series.exclusions.len(),
            fractals: result.fractals.len(),
            strokes: result.strokes.len(),
            segments: result.segments.len(),
            stroke_pivots: result.stroke_pivots.len(),
            segment_pivots: result.segment_pivots.len(),
            divergences: result.divergences.len(),
        }
    }
}

#[derive(Debug, Serialize)]
struct Report {
    source: PathBuf,
    bars: usize,
    timeframes: Vec<TimeframeReport>,
    resonances: Vec<Resonance>,
}

fn print_usage(program: &str) {
    eprintln!("Usage: {program} <csv_path> [options]");
    eprintln!("Options:");
    eprintln!("  --config PATH        TOML config (default: ./chan.toml, then user config dir)");
    eprintln!("  --timeframes LIST    Comma-separated labels, e.g. 1d,1w,1M");
    eprintln!("  --tolerance SECS     Resonance alignment tolerance in seconds");
    eprintln!("  --validate DATE      Evaluate calls made up to DATE against later data");
    eprintln!("  --horizon N          Bars after DATE to evaluate against (default: all)");
    eprintln!("  --full               Include full analysis results");
    eprintln!("  --compact            Print compact JSON");
}

fn load_config(options: &Options) -> Result<Config> {
    let config = match &options.config_path {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::load_default(),
    };
    apply_options(config, options)
}

/// Command-line values take precedence over the config file.
fn apply_options(mut config: Config, options: &Options) -> Result<Config> {
    if let Some(timeframes) = &options.timeframes {
        config.alignment.timeframes = timeframes.clone();
    }
    if let Some(tolerance) = options.tolerance_secs {
        config.alignment.tolerance_secs = tolerance;
    }
    if options.compact {
        config.general.pretty = false;
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn build_coordinator(
    config: &Config,
    timeframes: &[Timeframe],
) -> Result<MultiTimeframeCoordinator> {
    let mut coordinator = MultiTimeframeCoordinator::new(
        config.analysis.default.clone(),
        config.alignment_config(),
    )?;
    for tf in timeframes {
        if config.analysis.timeframes.contains_key(tf.label()) {
            coordinator =
                coordinator.with_timeframe_config(*tf, config.analysis_for_timeframe(tf.label()))?;
        }
    }
    Ok(coordinator)
}

fn evaluate(
    coordinator: &MultiTimeframeCoordinator,
    timeframe: Timeframe,
    bars: &[Bar],
    options: &Options,
) -> Option<Result<AccuracyReport>> {
    let validation_date = options.validation_date?;
    let config = coordinator.analyzer_for(timeframe).config().clone();
    let result = AccuracyEvaluator::new(config)
        .map_err(anyhow::Error::from)
        .and_then(|evaluator| {
            evaluator
                .evaluate(bars, validation_date, options.horizon)
                .map_err(anyhow::Error::from)
        });
    Some(result)
}

fn main() -> Result<()> {
    env_logger::init();
    let start_time = Instant::now();

    let args: Vec<String> = env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage(&args[0]);
        return Ok(());
    }

    let options = Options::parse(&args)?;
    let config = load_config(&options)?;

    let Some(csv_path) = options
        .csv_path
        .clone()
        .or_else(|| config.general.data_path.clone())
    else {
        print_usage(&args[0]);
        std::process::exit(1);
    };

    let bars = CsvLoader::new(&csv_path)
        .load()
        .with_context(|| format!("failed to load {}", csv_path.display()))?;

    let timeframes = config.timeframes()?;
    let built = TimeframeDataBuilder::new(timeframes.clone()).build(&bars);
    let data = built.data();

    let coordinator = build_coordinator(&config, &timeframes)?;
    let result = coordinator.analyze(&data);
    let scorer = QualityScorer::new(config.scoring.clone())?;

    let mut reports = Vec::with_capacity(result.outcomes.len());
    for (outcome, (_, tf_bars)) in result.outcomes.iter().zip(&built.series) {
        let mut report = TimeframeReport {
            timeframe: outcome.timeframe,
            bars: tf_bars.len(),
            error: None,
            summary: None,
            quality: None,
            accuracy: None,
            accuracy_error: None,
            analysis: None,
        };

        match &outcome.result {
            Ok(analysis) => {
                report.summary = Some(Summary::of(analysis));
                report.quality = Some(scorer.score(analysis));
                if options.full {
                    report.analysis = Some(analysis.clone());
                }
            }
            Err(e) => report.error = Some(e.to_string()),
        }

        match evaluate(&coordinator, outcome.timeframe, tf_bars, &options) {
            Some(Ok(accuracy)) => report.accuracy = Some(accuracy),
            Some(Err(e)) => report.accuracy_error = Some(format!("{e:#}")),
            None => {}
        }

        reports.push(report);
    }

    let report = Report {
        source: csv_path,
        bars: bars.len(),
        timeframes: reports,
        resonances: result.resonances,
    };

    let json = if config.general.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{json}");

    log::info!("done in {:.2}s", start_time.elapsed().as_secs_f32());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("chan")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_parse_options() {
        let options = Options::parse(&args(&[
            "bars.csv",
            "--timeframes",
            "1d, 1w",
            "--tolerance",
            "3600",
            "--validate",
            "2024-01-01",
            "--horizon",
            "20",
            "--full",
        ]))
        .unwrap();

        assert_eq!(options.csv_path, Some(PathBuf::from("bars.csv")));
        assert_eq!(
            options.timeframes,
            Some(vec!["1d".to_string(), "1w".to_string()])
        );
        assert_eq!(options.tolerance_secs, Some(3600.0));
        assert_eq!(options.validation_date, Some(1_704_067_200.0));
        assert_eq!(options.horizon, Some(20));
        assert!(options.full);
        assert!(!options.compact);
    }

    #[test]
    fn test_bad_values_are_errors() {
        assert!(Options::parse(&args(&["--horizon", "many"])).is_err());
        assert!(Options::parse(&args(&["--validate", "soon"])).is_err());
    }

    #[test]
    fn test_cli_overrides_config() {
        let options =
            Options::parse(&args(&["--timeframes", "1h,1d", "--tolerance", "60"])).unwrap();
        let config = apply_options(Config::default(), &options).unwrap();
        assert_eq!(config.alignment.tolerance_secs, 60.0);
        assert_eq!(
            config.timeframes().unwrap(),
            vec![Timeframe::Hour1, Timeframe::Day1]
        );
    }

    #[test]
    fn test_invalid_cli_value_fails_validation() {
        let options = Options::parse(&args(&["--timeframes", "1d,2d"])).unwrap();
        assert!(apply_options(Config::default(), &options).is_err());
    }
}
