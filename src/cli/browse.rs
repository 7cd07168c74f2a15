use anyhow::{anyhow, Result};
use clap::Args;
use serde_json::Value;
use std::io::Write;
use std::str::FromStr;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use pagewise::{LoadingState, Pager, PagerState};

/// Navigate the collection interactively
#[derive(Args, Default)]
pub struct BrowseCommand {
    /// Do not print a prompt before reading each command
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,
}

/// One line of browse input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BrowseAction {
    Next,
    Prev,
    GoTo(usize),
    Size(usize),
    Sync,
    Clear,
    Pages,
    Help,
    Quit,
}

impl FromStr for BrowseAction {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let mut parts = line.split_whitespace();
        let command = parts.next().unwrap_or_default().to_lowercase();
        let mut number = |name: &str| -> Result<usize> {
            parts
                .next()
                .ok_or_else(|| anyhow!("{} needs a number", name))?
                .parse()
                .map_err(|e| anyhow!("Invalid number for {}: {}", name, e))
        };

        match command.as_str() {
            "n" | "next" => Ok(Self::Next),
            "p" | "prev" => Ok(Self::Prev),
            "g" | "goto" => Ok(Self::GoTo(number("goto")?)),
            "s" | "size" => Ok(Self::Size(number("size")?)),
            "sync" => Ok(Self::Sync),
            "clear" => Ok(Self::Clear),
            "pages" => Ok(Self::Pages),
            "h" | "help" | "?" => Ok(Self::Help),
            "q" | "quit" | "exit" => Ok(Self::Quit),
            "" => Err(anyhow!("Empty command")),
            other => Err(anyhow!("Unknown command '{}'. Type 'help' for commands.", other)),
        }
    }
}

const HELP: &str = "Commands: n|next, p|prev, g|goto N, s|size N, sync, clear, pages, help, q|quit";

impl BrowseCommand {
    pub async fn execute(&self, pager: &Pager<Value>) -> Result<()> {
        // Failures are recorded in the pager state and shown with the page
        if let Err(e) = pager.load_initial().await {
            debug!("Initial load failed: {}", e);
        }
        print_state(&pager.state());

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            self.prompt()?;
            let Some(line) = lines.next_line().await? else {
                break;
            };

            let action = match line.parse::<BrowseAction>() {
                Ok(action) => action,
                Err(e) => {
                    eprintln!("{}", e);
                    continue;
                }
            };

            match action {
                BrowseAction::Quit => break,
                BrowseAction::Help => println!("{}", HELP),
                BrowseAction::Pages => {
                    pager.wait_for_prefetch().await;
                    println!("Cached pages: {:?}", pager.state().available_pages());
                }
                action => {
                    if let Err(e) = apply(pager, action).await {
                        debug!("{:?} failed: {}", action, e);
                    }
                    print_state(&pager.state());
                }
            }
        }

        Ok(())
    }

    fn prompt(&self) -> Result<()> {
        if !self.quiet {
            print!("> ");
            std::io::stdout().flush()?;
        }
        Ok(())
    }
}

async fn apply(pager: &Pager<Value>, action: BrowseAction) -> Result<()> {
    match action {
        BrowseAction::Next => pager.next().await?,
        BrowseAction::Prev => pager.prev().await?,
        BrowseAction::GoTo(page) => pager.go_to(page).await?,
        BrowseAction::Size(size) => {
            let options = &pager.config().items_per_page_options;
            if !options.contains(&size) {
                eprintln!("Page size must be one of {:?}", options);
                return Ok(());
            }
            pager.set_items_per_page(size).await?
        }
        BrowseAction::Sync => pager.sync().await?,
        BrowseAction::Clear => pager.clear_all().await?,
        BrowseAction::Pages | BrowseAction::Help | BrowseAction::Quit => {}
    }
    Ok(())
}

/// Print the displayed page followed by a status line
pub(super) fn print_state(state: &PagerState<Value>) {
    if state.records.is_empty() {
        println!("(no records)");
    }

    let first_index = first_record_index(state);
    for (offset, record) in state.records.iter().enumerate() {
        println!("{:>6}  {}", first_index.saturating_add(offset), record);
    }

    println!("{}", status_line(state));
    if let Some(error) = &state.error {
        println!("! {}", error);
    }
}

/// 1-based position of the first record shown on the current page
fn first_record_index<R>(state: &PagerState<R>) -> usize {
    state
        .current_page
        .saturating_sub(1)
        .saturating_mul(state.items_per_page)
        .saturating_add(1)
}

fn status_line<R>(state: &PagerState<R>) -> String {
    let activity = match state.loading_state() {
        LoadingState::Idle => "",
        LoadingState::LoadingPrimary => " | loading",
        LoadingState::Prefetching => " | fetching next pages",
        LoadingState::Executing => " | syncing",
        LoadingState::Clearing => " | clearing",
    };
    let next = if state.has_next() { "next cached" } else { "next not cached" };

    format!(
        "Page {} of {} | {} per page | {} total | {}{}",
        state.current_page,
        state.total_pages().max(1),
        state.items_per_page,
        state.total_elements,
        next,
        activity
    )
}
