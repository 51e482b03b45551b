//! Hand-rolled CLI for running, calibrating, and evaluating the agent.
//!
//! Three subcommands: `rollout`, `calibrate`, `evaluate`. Argument parsing is
//! a small manual switch over `std::env::args` rather than a dedicated
//! crate, matching how the rest of this stack keeps its binaries dependency
//! light.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use rand::SeedableRng;
use rand::rngs::StdRng;

use robust_semantic_agent::{
    calibrate_thresholds, credal_report, risk_report, safety_report, Agent, Configuration,
    Environment, Episode, ForbiddenCircleEnv,
};

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let Some(subcommand) = args.get(1) else {
        eprintln!("usage: agent-cli <rollout|calibrate|evaluate> [flags...]");
        return ExitCode::from(1);
    };

    let result = match subcommand.as_str() {
        "rollout" => run_rollout(&args[2..]),
        "calibrate" => run_calibrate(&args[2..]),
        "evaluate" => run_evaluate(&args[2..]),
        other => {
            eprintln!("unknown subcommand '{other}'");
            Err(1)
        }
    };

    match result {
        Ok(()) => ExitCode::from(0),
        Err(code) => ExitCode::from(code),
    }
}

fn flag_value<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn has_flag(args: &[String], name: &str) -> bool {
    args.iter().any(|a| a == name)
}

fn run_rollout(args: &[String]) -> Result<(), u8> {
    let Some(config_path) = flag_value(args, "--config") else {
        eprintln!("rollout: --config PATH is required");
        return Err(1);
    };
    let Some(episodes_str) = flag_value(args, "--episodes") else {
        eprintln!("rollout: --episodes N is required");
        return Err(1);
    };
    let episodes: u64 = episodes_str.parse().map_err(|_| {
        eprintln!("rollout: --episodes must be a non-negative integer");
        1
    })?;
    let log_dir = flag_value(args, "--log-dir").unwrap_or("./runs");
    let enable_query = has_flag(args, "--enable-query");

    let mut config = Configuration::from_path(Path::new(config_path)).map_err(|e| {
        eprintln!("rollout: invalid configuration: {e}");
        1u8
    })?;
    if enable_query {
        config.query.enabled = true;
    }

    let out_path = PathBuf::from(log_dir).join("episodes.jsonl");
    let max_timesteps = config.horizon;
    let env_config = config.env.clone();
    let mut env = ForbiddenCircleEnv::new(env_config, max_timesteps, false);
    let mut rng = StdRng::seed_from_u64(config.seed);

    for episode_id in 0..episodes {
        let mut agent = Agent::new(config.clone(), None).map_err(|e| {
            eprintln!("rollout: failed to construct agent: {e}");
            2u8
        })?;
        let mut episode = Episode::new(episode_id, &config).map_err(|e| {
            eprintln!("rollout: failed to start episode record: {e}");
            2u8
        })?;

        let mut obs = env.reset(&mut rng);
        for _ in 0..max_timesteps {
            let (action, annotation) = agent.act(&obs, Some(&mut env)).map_err(|e| {
                eprintln!("rollout: agent step failed: {e}");
                2u8
            })?;
            let outcome = env.step(&action, &mut rng);
            episode.add_step(
                outcome.info["true_state"]
                    .as_array()
                    .map(|a| a.iter().filter_map(serde_json::Value::as_f64).collect())
                    .unwrap_or_default(),
                action,
                obs,
                outcome.reward,
                annotation,
            );
            obs = outcome.observation;
            if outcome.done {
                break;
            }
        }

        episode.compute_return(config.discount);
        episode.save(&out_path).map_err(|e| {
            eprintln!("rollout: failed to write episode log: {e}");
            2u8
        })?;
    }

    println!("rollout: wrote {episodes} episodes to {}", out_path.display());
    Ok(())
}

fn run_calibrate(args: &[String]) -> Result<(), u8> {
    let target_ece: f64 = flag_value(args, "--target-ece")
        .unwrap_or("0.05")
        .parse()
        .map_err(|_| {
            eprintln!("calibrate: --target-ece must be a number");
            1u8
        })?;
    let Some(output_dir) = flag_value(args, "--output") else {
        eprintln!("calibrate: --output DIR is required");
        return Err(1);
    };
    let n_samples: usize = flag_value(args, "--n-samples")
        .unwrap_or("500")
        .parse()
        .map_err(|_| {
            eprintln!("calibrate: --n-samples must be an integer");
            1u8
        })?;

    let samples = if let Some(input_path) = flag_value(args, "--input") {
        load_calibration_samples(Path::new(input_path)).map_err(|e| {
            eprintln!("calibrate: failed to read --input: {e}");
            2u8
        })?
    } else {
        synthesize_calibration_samples(n_samples)
    };

    let cost = robust_semantic_agent::semantics::CostMatrix::default();
    let result = calibrate_thresholds(&samples, Some(cost));

    std::fs::create_dir_all(output_dir).map_err(|e| {
        eprintln!("calibrate: failed to create --output dir: {e}");
        2u8
    })?;
    let out_path = PathBuf::from(output_dir).join("calibration.json");
    let payload = serde_json::json!({
        "tau": result.tau,
        "tau_prime": result.tau_prime,
        "ece_before": result.ece_before,
        "ece_after": result.ece_after,
        "target_ece": target_ece,
        "target_met": result.ece_after <= target_ece,
        "n_samples": samples.len(),
    });
    std::fs::write(&out_path, serde_json::to_string_pretty(&payload).unwrap()).map_err(|e| {
        eprintln!("calibrate: failed to write calibration.json: {e}");
        2u8
    })?;

    println!("calibrate: wrote {}", out_path.display());
    Ok(())
}

fn load_calibration_samples(
    path: &Path,
) -> Result<Vec<robust_semantic_agent::semantics::CalibrationSample>, String> {
    let text = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str::<robust_semantic_agent::semantics::CalibrationSample>(line)
                .map_err(|e| e.to_string())
        })
        .collect()
}

/// Two-Beta-cluster synthetic generator matching the test suite's
/// calibration scenario: a "mostly true" cluster concentrated at high
/// support/low countersupport and a "mostly false" cluster at the mirror
/// point, each with modest spread.
fn synthesize_calibration_samples(
    n: usize,
) -> Vec<robust_semantic_agent::semantics::CalibrationSample> {
    use robust_semantic_agent::semantics::CalibrationSample;
    let mut rng = StdRng::seed_from_u64(7);
    let mut samples = Vec::with_capacity(n);
    for i in 0..n {
        let ground_truth = i % 2 == 0;
        let (center_s, center_c) = if ground_truth { (0.85, 0.1) } else { (0.15, 0.85) };
        let jitter = |rng: &mut StdRng| -> f64 {
            let u1: f64 = rand::Rng::gen_range(rng, 1e-12..1.0);
            let u2: f64 = rand::Rng::gen_range(rng, 0.0..1.0);
            (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos() * 0.1
        };
        let support = (center_s + jitter(&mut rng)).clamp(0.0, 1.0);
        let countersupport = (center_c + jitter(&mut rng)).clamp(0.0, 1.0);
        samples.push(CalibrationSample {
            support,
            countersupport,
            ground_truth,
        });
    }
    samples
}

fn run_evaluate(args: &[String]) -> Result<(), u8> {
    let Some(runs_dir) = flag_value(args, "--runs-dir") else {
        eprintln!("evaluate: --runs-dir DIR is required");
        return Err(1);
    };
    let Some(output_dir) = flag_value(args, "--output") else {
        eprintln!("evaluate: --output DIR is required");
        return Err(1);
    };

    let episodes_path = PathBuf::from(runs_dir).join("episodes.jsonl");
    let episodes = Episode::load_all(&episodes_path).map_err(|e| {
        eprintln!("evaluate: failed to read {}: {e}", episodes_path.display());
        2u8
    })?;

    let returns: Vec<f64> = episodes.iter().map(|e| e.total_return).collect();
    let safety = safety_report(&episodes);
    let risk = risk_report(&returns, 0.1);
    let credal = credal_report(&episodes);

    let mut payload = serde_json::json!({
        "safety": safety,
        "risk": risk,
        "credal": credal,
    });

    if let Some(baseline_dir) = flag_value(args, "--baseline-dir") {
        let baseline_path = PathBuf::from(baseline_dir).join("episodes.jsonl");
        let baseline_episodes = Episode::load_all(&baseline_path).map_err(|e| {
            eprintln!("evaluate: failed to read --baseline-dir: {e}");
            2u8
        })?;
        let baseline_returns: Vec<f64> =
            baseline_episodes.iter().map(|e| e.total_return).collect();
        payload["baseline"] = serde_json::json!({
            "safety": safety_report(&baseline_episodes),
            "risk": risk_report(&baseline_returns, 0.1),
            "credal": credal_report(&baseline_episodes),
        });
    }

    std::fs::create_dir_all(output_dir).map_err(|e| {
        eprintln!("evaluate: failed to create --output dir: {e}");
        2u8
    })?;
    let out_path = PathBuf::from(output_dir).join("report.json");
    std::fs::write(&out_path, serde_json::to_string_pretty(&payload).unwrap()).map_err(|e| {
        eprintln!("evaluate: failed to write report.json: {e}");
        2u8
    })?;

    println!("evaluate: wrote {}", out_path.display());
    Ok(())
}
