use chrono::Local;
use flexi_logger::{Duplicate, FileSpec, Logger};
use genfeat::param;
use genfeat::run;
use log::{error, info, warn};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::env;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

fn main() {
    let param_path = env::args().nth(1).unwrap_or_else(|| "param.yaml".to_string());
    let param = match param::get(param_path.clone()) {
        Ok(param) => param,
        Err(e) => {
            eprintln!("Cannot load parameters from {}: {}", param_path, e);
            process::exit(1);
        }
    };

    let logger = if param.general.log_base.is_empty() {
        Logger::try_with_str(&param.general.log_level).map(|l| l.log_to_stdout())
    } else {
        let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S").to_string();
        Logger::try_with_str(&param.general.log_level).map(|l| {
            l.log_to_file(
                FileSpec::default()
                    .basename(format!("{}_{}", param.general.log_base, timestamp))
                    .suppress_timestamp()
                    .suffix(&param.general.log_suffix),
            )
            .duplicate_to_stdout(Duplicate::Info)
        })
    };
    let _logger_handle = match logger.and_then(|l| l.start()) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Cannot start logger: {}", e);
            process::exit(1);
        }
    };

    let version = match option_env!("GENFEAT_GIT_SHA") {
        Some(sha) => format!("{}_{}", env!("CARGO_PKG_VERSION"), sha),
        None => env!("CARGO_PKG_VERSION").to_string(),
    };
    info!("genfeat v{}", version);

    let running = Arc::new(AtomicBool::new(true));
    match Signals::new([SIGINT, SIGTERM]) {
        Ok(mut signals) => {
            let flag = Arc::clone(&running);
            thread::spawn(move || {
                for signal in signals.forever() {
                    if !flag.swap(false, Ordering::Relaxed) {
                        process::exit(130);
                    }
                    warn!("Signal {} received, stopping after the current generation", signal);
                }
            });
        }
        Err(e) => error!("Cannot register signal handler: {}", e),
    }

    if param.general.thread_number > 0 {
        if let Err(e) = rayon::ThreadPoolBuilder::new()
            .num_threads(param.general.thread_number)
            .build_global()
        {
            error!("Cannot configure thread pool: {}", e);
        }
    }

    match run(&param, running) {
        Ok(result) => {
            println!("Fitness: {}", result.fitness);
            println!("Generations: {} ({} evaluations, {} cache hits)", result.generations, result.evaluations, result.cache_hits);
            for (name, weight) in result.weights.iter().filter(|(_, w)| *w != 0.0) {
                println!("{:>10.6}  {}", weight, name);
            }
        }
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    }
}
