//! nodemark CLI — driving adapter for the labeling engine.
//!
//! Subcommands:
//! - `eval <rules> [--features <snapshot>] [--discover]` — evaluate rules,
//!   print `name=value` lines
//! - `check <rules>` — validate a rule file loads without errors
//!
//! Rule files are JSON or YAML (by extension); feature snapshots use the
//! same formats.

use std::process;

use nodemark::{Features, RuleSet};

mod probe;

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let result = match args[1].as_str() {
        "eval" => cmd_eval(&args[2..]),
        "check" => cmd_check(&args[2..]),
        "--help" | "-h" | "help" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("error: unknown command \"{other}\"");
            print_usage();
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Commands
// ═══════════════════════════════════════════════════════════════════════════════

fn cmd_eval(args: &[String]) -> Result<(), String> {
    let args = parse_eval_args(args)?;
    let rules = load_rules(&args.rules)?;

    let mut features = Features::new();
    if let Some(path) = &args.features {
        features.merge(load_features(path)?);
    }
    if args.discover {
        features.merge(probe::discover());
    }

    for (name, value) in rules.evaluate(&features) {
        println!("{name}={value}");
    }

    Ok(())
}

fn cmd_check(args: &[String]) -> Result<(), String> {
    if args.is_empty() {
        return Err("check requires a rule file path".to_owned());
    }

    let rules = load_rules(&args[0])?;
    println!("Rules valid ({} rule(s))", rules.len());
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Argument parsing
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
struct EvalArgs {
    rules: String,
    features: Option<String>,
    discover: bool,
}

fn parse_eval_args(args: &[String]) -> Result<EvalArgs, String> {
    let mut rules = None;
    let mut features = None;
    let mut discover = false;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--features" => {
                i += 1;
                let path = args
                    .get(i)
                    .ok_or_else(|| "--features requires a path".to_owned())?;
                features = Some(path.clone());
            }
            "--discover" => discover = true,
            arg if arg.starts_with("--") => {
                return Err(format!("unexpected option \"{arg}\""));
            }
            arg => {
                if rules.replace(arg.to_owned()).is_some() {
                    return Err("multiple rule file paths given".to_owned());
                }
            }
        }
        i += 1;
    }

    let rules = rules.ok_or_else(|| "eval requires a rule file path".to_owned())?;
    if features.is_none() && !discover {
        return Err("eval needs --features <snapshot> and/or --discover".to_owned());
    }

    Ok(EvalArgs {
        rules,
        features,
        discover,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// File loading
// ═══════════════════════════════════════════════════════════════════════════════

fn load_rules(path: &str) -> Result<RuleSet, String> {
    let content = read_file(path)?;
    if is_json(path) {
        serde_json::from_str(&content).map_err(|e| format!("invalid rules in \"{path}\": {e}"))
    } else {
        serde_yaml::from_str(&content).map_err(|e| format!("invalid rules in \"{path}\": {e}"))
    }
}

fn load_features(path: &str) -> Result<Features, String> {
    let content = read_file(path)?;
    if is_json(path) {
        serde_json::from_str(&content).map_err(|e| format!("invalid snapshot \"{path}\": {e}"))
    } else {
        serde_yaml::from_str(&content).map_err(|e| format!("invalid snapshot \"{path}\": {e}"))
    }
}

fn read_file(path: &str) -> Result<String, String> {
    std::fs::read_to_string(path).map_err(|e| format!("failed to read \"{path}\": {e}"))
}

fn is_json(path: &str) -> bool {
    std::path::Path::new(path)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

fn print_usage() {
    eprintln!(
        "Usage: nodemark <command> [options]

Commands:
  eval <rules> [--features <snapshot>] [--discover]
                     Evaluate rules and print the resulting labels.
                     --features reads a feature snapshot file,
                     --discover probes the local node; both may be
                     combined (probed data wins on conflict).
  check <rules>      Validate that a rule file loads
  help               Show this help"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn eval_args_require_rule_path() {
        assert!(parse_eval_args(&[]).is_err());
        assert!(parse_eval_args(&args(&["--discover"])).is_err());
    }

    #[test]
    fn eval_args_require_a_feature_source() {
        assert!(parse_eval_args(&args(&["rules.json"])).is_err());
    }

    #[test]
    fn eval_args_with_snapshot() {
        let parsed =
            parse_eval_args(&args(&["rules.json", "--features", "features.json"])).unwrap();
        assert_eq!(parsed.rules, "rules.json");
        assert_eq!(parsed.features.as_deref(), Some("features.json"));
        assert!(!parsed.discover);
    }

    #[test]
    fn eval_args_with_discover() {
        let parsed = parse_eval_args(&args(&["rules.yaml", "--discover"])).unwrap();
        assert!(parsed.discover);
        assert!(parsed.features.is_none());
    }

    #[test]
    fn eval_args_reject_unknown_options() {
        assert!(parse_eval_args(&args(&["rules.json", "--frobnicate"])).is_err());
    }

    #[test]
    fn eval_args_reject_two_rule_paths() {
        assert!(parse_eval_args(&args(&["a.json", "b.json", "--discover"])).is_err());
    }

    #[test]
    fn missing_features_value_is_an_error() {
        assert!(parse_eval_args(&args(&["rules.json", "--features"])).is_err());
    }

    #[test]
    fn json_extension_detection() {
        assert!(is_json("rules.json"));
        assert!(is_json("RULES.JSON"));
        assert!(!is_json("rules.yaml"));
        assert!(!is_json("rules"));
    }
}
