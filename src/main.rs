#![cfg(not(tarpaulin_include))]

use clap::{Args, Parser, Subcommand};
use log::info;
use scorecard::downloader::export_to_path;
use scorecard::model::{BoardId, CategoryId, IndicatorId};
use scorecard::relations::{RelationGraph, validate};
use scorecard::sheet::BscSheet;
use scorecard::sync::{CellEdit, EditOutcome, SyncEngine};
use scorecard::{Config, HttpApi, ScorecardApi, ScorecardError, workflow};
use std::collections::HashSet;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "scorecard", about = "Balanced ScoreCard client")]
struct Cli {
    /// Base URL of the API, e.g. http://127.0.0.1:8000/api
    #[arg(long)]
    api_url: Option<String>,

    /// Bearer token
    #[arg(long)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Clone)]
struct View {
    bsc: BoardId,

    /// Indicators whose children are shown
    #[arg(long, value_delimiter = ',')]
    expand: Vec<IndicatorId>,

    /// Expand every indicator that has children
    #[arg(long)]
    all: bool,
}

#[derive(Subcommand)]
enum Command {
    /// List boards
    Boards,
    /// List categories
    Categories,
    /// Print the indicator hierarchy
    Tree,
    /// Report inconsistent parent/child records
    Check,
    /// Show every indicator connected to one
    Group { indicator: IndicatorId },
    /// Print a board as a grid
    Show(View),
    /// Set one monthly cell, e.g. `edit 1 J3 85`
    Edit {
        #[command(flatten)]
        view: View,
        cell: String,
        value: String,
    },
    /// Persist every editable indicator of a board
    Save(View),
    /// Assign categories to an indicator and everything related to it
    Assign {
        indicator: IndicatorId,
        categories: Vec<CategoryId>,
    },
    /// Link a parent and a child indicator
    Link {
        parent: IndicatorId,
        child: IndicatorId,
    },
    /// Remove a relation by id, or by `--between PARENT CHILD`
    Unlink {
        relation: Option<i64>,
        #[arg(long, num_args = 2, value_names = ["PARENT", "CHILD"])]
        between: Option<Vec<IndicatorId>>,
    },
    /// Move a board category from one position to another (1-based)
    Move {
        bsc: BoardId,
        from: usize,
        to: usize,
    },
    /// Write a board to .csv (or .xlsx)
    Export {
        #[command(flatten)]
        view: View,
        path: PathBuf,
    },
    /// Edit a board from a prompt
    Interactive(View),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    if let Some(url) = cli.api_url {
        config.api_base_url = url.trim_end_matches('/').to_string();
    }
    if cli.token.is_some() {
        config.token = cli.token;
    }

    let api = Arc::new(HttpApi::new(&config)?);
    info!("using {}", api.base_url());

    match cli.command {
        Command::Boards => {
            for board in api.list_boards().await? {
                println!("{:>4}  {:<30} categories {:?}", board.id, board.name, board.categories);
            }
        }
        Command::Categories => {
            for category in api.list_categories().await? {
                println!(
                    "{:>4}  {:<30} {}",
                    category.id,
                    category.name,
                    category.description.unwrap_or_default()
                );
            }
        }
        Command::Tree => {
            let indicators = api.list_indicators().await?;
            let graph = RelationGraph::build(&indicators);
            let names: std::collections::HashMap<_, _> =
                indicators.iter().map(|i| (i.id, i.display_name())).collect();
            for root in graph.roots() {
                for (id, depth) in graph.walk(root, |_| true) {
                    println!(
                        "{}{} {}",
                        "    ".repeat(depth),
                        id,
                        names.get(&id).copied().unwrap_or("")
                    );
                }
            }
        }
        Command::Check => {
            let issues = validate(&api.list_indicators().await?);
            if issues.is_empty() {
                println!("ok");
            }
            for issue in issues {
                println!("{}", issue);
            }
        }
        Command::Group { indicator } => {
            let graph = RelationGraph::build(&api.list_indicators().await?);
            if !graph.contains(indicator) {
                return Err(ScorecardError::UnknownIndicator(indicator).into());
            }
            println!("{:?}", graph.group(indicator));
        }
        Command::Show(view) => {
            let engine = SyncEngine::connect(api, &config).await?;
            load_sheet(&engine, &view).await?.display();
        }
        Command::Edit { view, cell, value } => {
            let engine = SyncEngine::connect(api, &config).await?;
            let sheet = load_sheet(&engine, &view).await?;
            let (row, col) = sheet
                .parse_cell_name(&cell)
                .ok_or_else(|| format!("invalid cell {}", cell))?;
            let report = engine
                .apply_batch(&sheet, vec![CellEdit::new(row, col, value)])
                .await;
            print_report(&report.outcomes);
        }
        Command::Save(view) => {
            let engine = SyncEngine::connect(api, &config).await?;
            let sheet = load_sheet(&engine, &view).await?;
            let saved = engine.save_all(&sheet).await?;
            println!("saved {} indicators", saved);
        }
        Command::Assign {
            indicator,
            categories,
        } => {
            let engine = SyncEngine::connect(api, &config).await?;
            let members = workflow::assign_group_categories(&engine, indicator, categories).await?;
            println!("updated {:?}", members);
        }
        Command::Link { parent, child } => {
            let engine = SyncEngine::connect(api, &config).await?;
            let relation = workflow::link_indicators(&engine, parent, child).await?;
            println!("relation {} created", relation.id);
        }
        Command::Unlink { relation, between } => {
            let engine = SyncEngine::connect(api, &config).await?;
            match (relation, between.as_deref()) {
                (Some(id), _) => workflow::unlink(&engine, id).await?,
                (None, Some(&[parent, child])) => {
                    let id = workflow::unlink_pair(&engine, parent, child).await?;
                    println!("relation {} removed", id);
                }
                _ => return Err("give a relation id or --between PARENT CHILD".into()),
            }
        }
        Command::Move { bsc, from, to } => {
            let mut board = api.get_board(bsc).await?;
            workflow::move_category_by_position(&mut board, from, to)?;
            let saved = workflow::save_board_order(api.as_ref(), &board).await?;
            println!("categories {:?}", saved.categories);
        }
        Command::Export { view, path } => {
            let engine = SyncEngine::connect(api, &config).await?;
            let sheet = load_sheet(&engine, &view).await?;
            export_to_path(&sheet, &path)?;
            println!("wrote {}", path.display());
        }
        Command::Interactive(view) => {
            let engine = SyncEngine::connect(api, &config).await?;
            interactive(&engine, view).await?;
            engine.shutdown();
        }
    }

    Ok(())
}

async fn load_sheet<A: ScorecardApi + 'static>(
    engine: &SyncEngine<A>,
    view: &View,
) -> Result<BscSheet, ScorecardError> {
    let board = engine.api().get_board(view.bsc).await?;
    let indicators = engine.snapshot();
    let expanded: HashSet<IndicatorId> = if view.all {
        indicators
            .iter()
            .filter(|i| i.has_children())
            .map(|i| i.id)
            .collect()
    } else {
        view.expand.iter().copied().collect()
    };
    Ok(BscSheet::materialize(&board, &indicators, &expanded))
}

fn print_report(outcomes: &[EditOutcome]) {
    for outcome in outcomes {
        match outcome {
            EditOutcome::Skipped { row, col, reason } => {
                println!("{}: skipped ({})", BscSheet::cell_name(*row, *col), reason)
            }
            EditOutcome::Persisted {
                indicator_id,
                field,
                value,
            } => println!("{} {} = {:?}", indicator_id, field, value),
            EditOutcome::Failed {
                indicator_id,
                field,
                error,
                reverted,
            } => println!(
                "{} {} failed: {}{}",
                indicator_id,
                field,
                error,
                if *reverted { " (reverted)" } else { "" }
            ),
        }
    }
}

async fn interactive<A: ScorecardApi + 'static>(
    engine: &SyncEngine<A>,
    mut view: View,
) -> Result<(), Box<dyn std::error::Error>> {
    let board = engine.api().get_board(view.bsc).await?;
    let mut expanded: HashSet<IndicatorId> = view.expand.drain(..).collect();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut status = String::from("ok");
    let mut show = true;
    let mut start_time = Instant::now();

    loop {
        let indicators = engine.snapshot();
        let sheet = BscSheet::materialize(&board, &indicators, &expanded);
        if show {
            sheet.display();
        }

        print!("[{:.1}] ({}) > ", start_time.elapsed().as_secs_f64(), status);
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let command = line.trim();
        start_time = Instant::now();

        if command.is_empty() {
            status = String::from("invalid command");
            continue;
        }

        match command {
            "q" => break,
            "help" => {
                println!("Commands:");
                println!("  q: Quit");
                println!("  r: Refresh from the server");
                println!("  save: Persist every editable indicator");
                println!("  toggle <id>: Expand or collapse an indicator");
                println!("  expand_all / collapse_all");
                println!("  disable_output / enable_output");
                println!("  <cell>=<value>: Set a monthly value, e.g. J3=85");
                continue;
            }
            "r" => {
                status = match engine.refresh().await {
                    Ok(()) => String::from("ok"),
                    Err(e) => e.to_string(),
                };
            }
            "save" => {
                status = match engine.save_all(&sheet).await {
                    Ok(n) => format!("saved {}", n),
                    Err(e) => e.to_string(),
                };
            }
            "expand_all" => {
                expanded = indicators
                    .iter()
                    .filter(|i| i.has_children())
                    .map(|i| i.id)
                    .collect();
                status = String::from("ok");
            }
            "collapse_all" => {
                expanded.clear();
                status = String::from("ok");
            }
            "disable_output" => {
                show = false;
                status = String::from("ok");
            }
            "enable_output" => {
                show = true;
                status = String::from("ok");
            }
            _ => {
                if let Some(id) = command.strip_prefix("toggle ") {
                    status = match id.trim().parse::<IndicatorId>() {
                        Ok(id) => {
                            if !expanded.remove(&id) {
                                expanded.insert(id);
                            }
                            String::from("ok")
                        }
                        Err(_) => String::from("invalid indicator"),
                    };
                } else if let Some((cell, value)) = command.split_once('=') {
                    status = match sheet.parse_cell_name(cell) {
                        Some((row, col)) => {
                            let report = engine
                                .apply_batch(&sheet, vec![CellEdit::new(row, col, value)])
                                .await;
                            print_report(&report.outcomes);
                            if report.failed() + report.skipped() == 0 {
                                String::from("ok")
                            } else {
                                String::from("edit not applied")
                            }
                        }
                        None => String::from("invalid cell"),
                    };
                } else {
                    status = String::from("invalid command");
                }
            }
        }
    }

    Ok(())
}
