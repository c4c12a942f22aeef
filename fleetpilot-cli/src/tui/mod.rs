//! Interactive table browser
//!
//! Elm-style loop: terminal and service events become [`app::Msg`]s,
//! [`app::update`] mutates the [`app::State`] and returns a
//! [`app::Command`], and the runtime executes commands (loads, storage
//! writes, exports) off the render path.

pub mod app;
pub mod view;
pub mod widgets;

use std::collections::VecDeque;
use std::io::{self, Stdout};
use std::sync::Arc;

use anyhow::{Context, Result};
use crossterm::event::{
    self, DisableFocusChange, DisableMouseCapture, EnableFocusChange, EnableMouseCapture, Event,
    KeyEventKind,
};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use tokio::sync::{broadcast, mpsc};

use crate::context::AppContext;
use crate::export;
use app::{Command, Msg, State};

type Term = Terminal<CrosstermBackend<Stdout>>;

pub async fn run(ctx: AppContext) -> Result<()> {
    let mut terminal = setup_terminal()?;
    let result = run_app(&mut terminal, &ctx).await;
    restore_terminal(&mut terminal)?;
    result
}

fn setup_terminal() -> Result<Term> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(
        stdout,
        EnterAlternateScreen,
        EnableMouseCapture,
        EnableFocusChange
    )
    .context("enter alternate screen")?;
    Terminal::new(CrosstermBackend::new(stdout)).context("create terminal")
}

fn restore_terminal(terminal: &mut Term) -> Result<()> {
    disable_raw_mode().context("disable raw mode")?;
    execute!(
        terminal.backend_mut(),
        DisableFocusChange,
        DisableMouseCapture,
        LeaveAlternateScreen
    )
    .context("leave alternate screen")?;
    terminal.show_cursor().context("show cursor")?;
    Ok(())
}

/// Forward terminal input to the loop. `event::read` blocks, so this
/// lives on its own thread and ends with the first failed send.
fn spawn_input_reader(tx: mpsc::UnboundedSender<Msg>) {
    std::thread::spawn(move || {
        loop {
            let msg = match event::read() {
                Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => Msg::Key(key),
                Ok(Event::Mouse(mouse)) => Msg::Mouse(mouse),
                Ok(Event::FocusGained) => Msg::FocusGained,
                Ok(Event::Resize(..)) => Msg::Resize,
                Ok(_) => continue,
                Err(e) => {
                    log::error!("Terminal input failed: {}", e);
                    break;
                }
            };
            if tx.send(msg).is_err() {
                break;
            }
        }
    });
}

fn spawn_auth_forwarder(ctx: &AppContext, tx: mpsc::UnboundedSender<Msg>) {
    let mut auth = ctx.events.subscribe_auth();
    tokio::spawn(async move {
        loop {
            match auth.recv().await {
                Ok(event) => {
                    if tx.send(Msg::Auth(event)).is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::debug!("Auth forwarder skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

async fn run_app(terminal: &mut Term, ctx: &AppContext) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    spawn_input_reader(tx.clone());
    spawn_auth_forwarder(ctx, tx.clone());
    let keep_alive = Arc::clone(&ctx.keep_alive).spawn(&ctx.events);

    let controller = ctx.table_controller().await;
    let mut state = State::new(controller, ctx.config.export_dir(), ctx.session.user());
    let mut queue = VecDeque::from([app::init(&mut state)]);

    loop {
        while let Some(command) = queue.pop_front() {
            execute_command(command, ctx, &mut state, &tx, &mut queue).await;
        }

        let effects = state.controller.flush();
        state.controller.apply_effects(effects).await;

        terminal.draw(|frame| view::render(frame, &mut state))?;
        if state.should_quit {
            break;
        }

        let Some(msg) = rx.recv().await else {
            break;
        };
        queue.push_back(app::update(&mut state, msg));
        while let Ok(msg) = rx.try_recv() {
            queue.push_back(app::update(&mut state, msg));
        }
    }

    if let Some(handle) = keep_alive {
        handle.abort();
    }
    Ok(())
}

async fn execute_command(
    command: Command,
    ctx: &AppContext,
    state: &mut State,
    tx: &mpsc::UnboundedSender<Msg>,
    queue: &mut VecDeque<Command>,
) {
    match command {
        Command::None => {}
        Command::LoadRecords(generation) => {
            let loader = Arc::clone(&ctx.loader);
            let tx = tx.clone();
            tokio::spawn(async move {
                let result = loader.load().await;
                let _ = tx.send(Msg::RecordsLoaded { generation, result });
            });
        }
        Command::Persist(effects) => state.controller.apply_effects(effects).await,
        Command::Export => {
            let view = state.controller.live_view();
            let result = export::export_view(
                &view,
                &state.export_dir,
                &state.controller.keys().layout,
                chrono::Local::now(),
            )
            .map_err(|e| format!("{:#}", e));
            queue.push_back(app::update(state, Msg::Exported(result)));
        }
        Command::Ping => {
            let keep_alive = Arc::clone(&ctx.keep_alive);
            tokio::spawn(async move { keep_alive.on_focus().await });
        }
        Command::Quit => state.should_quit = true,
    }
}
