use std::io::{self, BufRead};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use anyhow::Context;
use takeoff_core::{update, AppState, Msg};
use takeoff_engine::EngineHandle;
use takeoff_logging::{set_dispatch_seq, takeoff_info};

use crate::commands::{self, Command, CommandError};
use crate::config::Config;
use crate::effects::EffectRunner;
use crate::{persistence, render};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

pub fn run(config: Config) -> anyhow::Result<()> {
    let engine =
        EngineHandle::new(config.backend_settings()).context("could not start backend engine")?;
    let mut dispatcher = Dispatcher {
        state: AppState::new(config.project.clone()),
        runner: EffectRunner::new(engine),
        config,
        seq: 0,
    };
    takeoff_info!(
        "reviewing project {} against {}",
        dispatcher.config.project,
        dispatcher.config.api_url
    );

    let restored =
        persistence::load_review_marks(&dispatcher.config.state_dir, &dispatcher.config.project);
    dispatcher.dispatch(Msg::RestoreReviewMarks(restored));
    dispatcher.dispatch(Msg::ResultsRefreshRequested);
    println!("type `help` for commands");

    let lines = spawn_stdin_reader();
    loop {
        match lines.recv_timeout(POLL_INTERVAL) {
            Ok(line) => match commands::parse(&line) {
                Ok(Command::Dispatch(msg)) => dispatcher.dispatch(msg),
                Ok(Command::Help) => println!("{}", commands::HELP),
                Ok(Command::Quit) => break,
                Err(CommandError::Empty) => {}
                Err(err) => println!("{err}"),
            },
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        for msg in dispatcher.runner.poll() {
            dispatcher.dispatch(msg);
        }
    }

    takeoff_info!("console closed after {} messages", dispatcher.seq);
    Ok(())
}

/// Owns the state and applies one message at a time.
struct Dispatcher {
    state: AppState,
    runner: EffectRunner,
    config: Config,
    seq: u64,
}

impl Dispatcher {
    fn dispatch(&mut self, msg: Msg) {
        self.seq += 1;
        set_dispatch_seq(self.seq);

        let state = std::mem::take(&mut self.state);
        let (mut state, effects) = update(state, msg);
        if state.consume_dirty() {
            for line in render::render(&state.view()) {
                println!("{line}");
            }
        }
        if state.consume_review_dirty() {
            persistence::save_review_marks(
                &self.config.state_dir,
                &self.config.project,
                &state.review_snapshot(),
            );
        }
        self.state = state;
        self.runner.run(effects);
    }
}

fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}
