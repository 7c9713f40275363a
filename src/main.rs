use std::process::ExitCode;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use log::error;
use log::info;

use relay_tui::config::Config;
use relay_tui::control_loop;
use relay_tui::diagnostic_log::redirect_stderr;
use relay_tui::gpio_cdev::CdevLine;
use relay_tui::hardware_line::OutputLine;
use relay_tui::hardware_line::RelayOutputs;
use relay_tui::relay_engine::RelayEngine;
use relay_tui::simulated_line::SimulatedLine;
use relay_tui::state_store::StateStore;

fn run(config: Config) -> Result<()> {
    if !config.log_to_stderr {
        redirect_stderr(&config.log_file).with_context(|| {
            format!("Failed to open log file '{}'", config.log_file.display())
        })?;
    }

    stderrlog::new()
        .module(module_path!())
        .quiet(config.quiet)
        .verbosity(config.log_verbosity())
        .timestamp(stderrlog::Timestamp::Second)
        .init()?;

    info!("Starting relay control");

    // a broken binding table must stop us before any line is driven
    let bindings = config.bindings().context("Invalid hardware binding")?;
    let timeout = config.hw_timeout().context("Invalid hardware timeout")?;

    let chip = config.gpio_chip.clone();
    let simulate = config.simulate;
    let outputs = RelayOutputs::new(&bindings, timeout, |binding| -> Box<dyn OutputLine> {
        match simulate {
            true => Box::new(SimulatedLine::new()),
            false => Box::new(CdevLine::new(chip.clone(), binding.line)),
        }
    })
    .context("Failed to start GPIO line workers")?;

    let mut engine = RelayEngine::start(StateStore::new(config.state_file.clone()), outputs);

    control_loop::run(&mut engine).context("Terminal interface failed")?;

    info!("Relay control finished");
    Ok(())
}

fn main() -> ExitCode {
    let config = Config::parse();
    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:?}", e);
            // standard error may be the log file by now
            println!("relay-tui: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
