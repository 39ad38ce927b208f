// Jazz Architect: CLI entry point.
//
// Generates, evaluates and prints jazz chord progressions.
//
// Usage:
//   cargo run -p jazz_architect_harmony --bin generate -- <command> [flags]
//
// Commands:
//   generate   [--length N] [--key K] [--style NAME] [--style-file PATH]
//              [--seed N] [--treebank PATH] [--evaluate] [--output PATH]
//   evaluate   (--chords "Dm7,G7,Cmaj7" | --input PATH) [--key K] [--verbose]
//   blues      [--key K] [--bars N] [--style NAME] [--seed N]
//   turnaround [--key K] [--style NAME] [--seed N]
//   treebank   --input PATH
//   styles
//
// Logging goes to stderr and is controlled by RUST_LOG (default
// jazz_architect_harmony=info).

use jazz_architect_harmony::chord::{ChordSymbol, format_progression};
use jazz_architect_harmony::engine::{StyleEngine, key_from_name};
use jazz_architect_harmony::evaluation::{Evaluation, evaluate_progression};
use jazz_architect_harmony::pitch::PitchClass;
use jazz_architect_harmony::style::{StylePreset, StyleVector};
use jazz_architect_harmony::treebank::{analyze, load_treebank};
use jazz_architect_harmony::voice_leading::analyze_progression;
use jazz_architect_harmony::{HarmonyError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

fn main() {
    init_tracing();
    let args: Vec<String> = std::env::args().collect();
    if let Err(e) = run(&args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("jazz_architect_harmony=info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn run(args: &[String]) -> Result<()> {
    match args.get(1).map(String::as_str) {
        Some("generate") => generate_command(args),
        Some("evaluate") => evaluate_command(args),
        Some("blues") => blues_command(args),
        Some("turnaround") => turnaround_command(args),
        Some("treebank") => treebank_command(args),
        Some("styles") => {
            styles_command();
            Ok(())
        }
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn print_usage() {
    println!("Usage: generate <command> [flags]");
    println!();
    println!("Commands:");
    println!("  generate    Generate a chord progression");
    println!("  evaluate    Evaluate a progression");
    println!("  blues       Generate blues changes");
    println!("  turnaround  Generate a turnaround");
    println!("  treebank    Show statistics learned from a treebank");
    println!("  styles      List available styles");
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct SavedProgression {
    style: String,
    key: String,
    seed: u64,
    chords: Vec<String>,
    substitutions: Vec<String>,
}

fn generate_command(args: &[String]) -> Result<()> {
    let length: usize = parse_flag(args, "--length")?.unwrap_or(8);
    let key = parse_key(args)?;
    let (style_label, style) = parse_style(args)?;
    let seed = parse_seed(args)?;

    let mut engine = StyleEngine::new(style, seed);
    if let Some(path) = flag_value(args, "--treebank") {
        engine.set_treebank(analyze(&load_treebank(Path::new(path))?));
    }
    let result = engine.generate_detailed(length, key);

    println!("Style: {}", style_label);
    println!("Key: {}", key);
    println!("Length: {} chords", result.chords.len());
    println!("Seed: {}", seed);
    if !result.substitutions.is_empty() {
        let applied: Vec<String> = result
            .substitutions
            .iter()
            .map(|(kind, n)| format!("{} x{}", kind, n))
            .collect();
        println!("Substitutions: {}", applied.join(", "));
    }
    if let Some(opt) = &result.optimization {
        println!(
            "Voice leading: cost {} -> {} ({} substitutions)",
            opt.initial_cost, opt.final_cost, opt.substitutions
        );
    }
    println!();
    println!("{}", format_progression(&result.chords, 4));

    if has_flag(args, "--evaluate") {
        println!();
        print_summary(&evaluate_progression(&result.chords, Some(key)));
    }

    if let Some(path) = flag_value(args, "--output") {
        let saved = SavedProgression {
            style: style_label,
            key: key.to_string(),
            seed,
            chords: result.chords.iter().map(|c| c.to_string()).collect(),
            substitutions: result
                .substitutions
                .iter()
                .map(|(kind, n)| format!("{}:{}", kind, n))
                .collect(),
        };
        std::fs::write(path, serde_json::to_string_pretty(&saved)?)?;
        println!();
        println!("Saved to {}", path);
    }
    Ok(())
}

#[derive(Deserialize)]
struct ProgressionFile {
    chords: Vec<String>,
    #[serde(default)]
    key: Option<String>,
}

fn evaluate_command(args: &[String]) -> Result<()> {
    let (texts, file_key) = if let Some(path) = flag_value(args, "--input") {
        let file: ProgressionFile = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        (file.chords, file.key)
    } else if let Some(list) = flag_value(args, "--chords") {
        (list.split(',').map(|s| s.trim().to_string()).collect(), None)
    } else {
        return Err(HarmonyError::InvalidArgument(
            "evaluate needs --chords or --input".to_string(),
        ));
    };

    let key = match flag_value(args, "--key").map(str::to_string).or(file_key) {
        Some(name) => key_from_name(&name)?,
        None => PitchClass::default(),
    };
    let chords: Vec<ChordSymbol> = texts.iter().map(|t| ChordSymbol::parse(t)).collect();

    let shown: Vec<String> = chords.iter().map(|c| c.to_string()).collect();
    println!("Evaluating: {}", shown.join(" | "));
    println!();
    let result = evaluate_progression(&chords, Some(key));
    print_summary(&result);

    if has_flag(args, "--verbose") {
        println!();
        println!("--- Metrics ---");
        println!("{}", result);
        println!();
        println!("--- Voice Leading Analysis ---");
        let vl = analyze_progression(&chords);
        println!("Total VL Cost: {}", vl.total_cost);
        println!("Average VL Cost: {:.2}", vl.average_cost);
        println!("Smooth transitions: {}", vl.smooth_transitions);
        println!("Rough transitions: {}", vl.rough_transitions);
        for (i, (text, chord)) in shown.iter().zip(&chords).enumerate() {
            println!("  {:2}. {:8} {}", i + 1, text, chord.roman_numeral(key));
        }
    }
    Ok(())
}

fn blues_command(args: &[String]) -> Result<()> {
    let key = parse_key(args)?;
    let bars: usize = parse_flag(args, "--bars")?.unwrap_or(12);
    let (style_label, style) = parse_style(args)?;
    let seed = parse_seed(args)?;

    let chords = StyleEngine::new(style, seed).generate_blues_changes(key, bars);
    println!("Blues in {} ({} bars, {} style)", key, bars, style_label);
    println!();
    println!("{}", format_progression(&chords, 4));
    Ok(())
}

fn turnaround_command(args: &[String]) -> Result<()> {
    let key = parse_key(args)?;
    let (style_label, style) = parse_style(args)?;
    let seed = parse_seed(args)?;

    let chords = StyleEngine::new(style, seed).generate_turnaround(key);
    println!("Turnaround in {} ({} style)", key, style_label);
    println!();
    println!("{}", format_progression(&chords, chords.len()));
    Ok(())
}

fn treebank_command(args: &[String]) -> Result<()> {
    let Some(path) = flag_value(args, "--input") else {
        return Err(HarmonyError::InvalidArgument(
            "treebank needs --input".to_string(),
        ));
    };
    let stats = analyze(&load_treebank(Path::new(path))?);
    println!("Trees analyzed: {}", stats.trees);

    println!();
    println!("--- Binary patterns ---");
    for ((parent, left, right), n) in &stats.binary {
        println!("  {} -> {} {}: {}", parent, left, right, n);
    }
    println!();
    println!("--- Chord types ---");
    for (kind, p) in stats.terminal_probabilities() {
        println!("  {:8} {:.4}", kind, p);
    }
    println!();
    println!("--- Progressions (top 15) ---");
    for ((from, to), n) in stats.top_progressions(15) {
        println!("  {} -> {}: {}", from, to, n);
    }
    println!();
    println!("--- Cadences ---");
    for (cadence, p) in stats.cadence_probabilities() {
        println!("  {:8} {:.4}", cadence, p);
    }
    println!();
    println!("--- Grammar rules ---");
    for (name, n) in &stats.rule_counts {
        println!("  {:20} {}", name, n);
    }
    Ok(())
}

fn styles_command() {
    println!("Available styles:");
    for preset in StylePreset::ALL {
        println!(
            "  {} {:14} - {}",
            preset.id(),
            preset.name(),
            preset.style().describe()
        );
    }
}

fn print_summary(result: &Evaluation) {
    println!("=== Evaluation Summary ===");
    println!("Variety Score:      {:.3}", result.variety);
    println!("Coherence Score:    {:.3}", result.coherence);
    println!("Voice Leading Cost: {:.3}", result.voice_leading_cost);
    println!("Smooth Ratio:       {:.1}%", result.smooth_ratio * 100.0);
    println!("---");
    println!("Overall Score:      {:.3}", result.overall_score());
}

// ---------------------------------------------------------------------------
// Flag parsing
// ---------------------------------------------------------------------------

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn parse_flag<T: FromStr>(args: &[String], flag: &str) -> Result<Option<T>> {
    match flag_value(args, flag) {
        None => Ok(None),
        Some(v) => v
            .parse()
            .map(Some)
            .map_err(|_| HarmonyError::InvalidArgument(format!("{} {}", flag, v))),
    }
}

fn parse_key(args: &[String]) -> Result<PitchClass> {
    key_from_name(flag_value(args, "--key").unwrap_or("C"))
}

/// `--style-file` wins over `--style`; the default is Bebop.
fn parse_style(args: &[String]) -> Result<(String, StyleVector)> {
    if let Some(path) = flag_value(args, "--style-file") {
        return Ok((path.to_string(), StyleVector::load(Path::new(path))?));
    }
    let preset = match flag_value(args, "--style") {
        Some(name) => StylePreset::from_name(name)?,
        None => StylePreset::default(),
    };
    Ok((preset.name().to_string(), preset.style()))
}

/// `--seed`, or the clock when absent.
fn parse_seed(args: &[String]) -> Result<u64> {
    if let Some(seed) = parse_flag(args, "--seed")? {
        return Ok(seed);
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    Ok(nanos)
}
