use anyhow::Context;
use ragchat::{
    setup_tracing,
    types::{ChatMessage, Role, UploadFile, UploadSource},
    App, Configuration, HistoryStore, RagClient, SqliteBackend, UploadCoordinator,
};
use std::{path::Path, sync::Arc};
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "\
commands:
  status                 check the backend
  list                   list documents
  upload <path>          upload and index a PDF
  url <url>              index a web page
  open <display name>    open a document's conversation
  ask <question>         ask about the open document (bare text works too)
  history                show the open conversation
  clear                  clear the open conversation
  delete <collection>    delete a collection and its conversation
  quit";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is only a development convenience, so a missing file is fine.
    dotenv::dotenv().ok();

    setup_tracing();

    tracing::debug!("Initializing configuration");
    let cfg = Configuration::new().context("Failed to read configuration")?;

    tracing::debug!("Opening history at {:?}", cfg.history_path);
    let backend = SqliteBackend::open(&cfg.history_path).context("Failed to open history")?;
    let store = Arc::new(HistoryStore::new(backend));
    let client = RagClient::new(&cfg).context("Failed to build HTTP client")?;
    let mut app = App::new(
        Arc::new(client),
        store,
        UploadCoordinator::new(cfg.upload_tick),
    );

    tracing::info!("Using backend {}", cfg.api_url);
    if let Err(err) = app.refresh().await {
        println!("{}. Showing locally stored conversations.", err);
    }
    print_documents(&app);
    println!("{}", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let (cmd, arg) = line.split_once(' ').unwrap_or((line, ""));
        let arg = arg.trim();
        match cmd {
            "" => {}
            "quit" | "exit" => break,
            "help" => println!("{}", HELP),
            "status" => {
                let state = if app.health().await { "up" } else { "unreachable" };
                println!("backend is {}", state);
            }
            "list" => {
                if let Err(err) = app.refresh().await {
                    println!("{} (retry with `list`)", err);
                }
                print_documents(&app);
            }
            "upload" => match tokio::fs::read(arg).await {
                Ok(bytes) => {
                    let name = Path::new(arg)
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| arg.to_string());
                    upload(&mut app, UploadSource::File(UploadFile::new(name, bytes))).await;
                }
                Err(err) => println!("cannot read '{}': {}", arg, err),
            },
            "url" => upload(&mut app, UploadSource::Url(arg.to_string())).await,
            "open" => {
                let session = if app.registry().find(arg).is_some() {
                    app.open_collection(arg)
                } else {
                    Some(app.open(arg, None))
                };
                let unbound = session.map_or(true, |s| s.collection_name().is_none());
                if unbound {
                    println!("'{}' has no collection, questions are disabled", arg);
                }
                print_history(&app);
            }
            "history" => print_history(&app),
            "clear" => {
                app.clear();
                println!("conversation cleared");
            }
            "delete" => match app.delete(arg).await {
                Ok(()) => print_documents(&app),
                Err(err) => println!("{} (retry with `delete {}`)", err, arg),
            },
            "ask" => ask(&mut app, arg).await,
            _ => ask(&mut app, line).await,
        }
    }

    Ok(())
}

async fn upload(app: &mut App, source: UploadSource) {
    let mut progress = app.uploads().subscribe();
    let ticker = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let value = *progress.borrow_and_update();
            eprint!("\rindexing... {:>3}%", value);
        }
    });

    let result = app.upload(&source).await;
    ticker.abort();
    eprintln!();

    match result {
        Ok(doc) => println!(
            "indexed '{}' as {}, conversation opened",
            doc.display_name, doc.collection_name
        ),
        Err(err) => println!("upload failed: {}", err),
    }
}

async fn ask(app: &mut App, question: &str) {
    match app.session() {
        None => {
            println!("open a document first");
            return;
        }
        Some(session) if !session.can_send() => {
            println!("this conversation has no collection, questions are disabled");
            return;
        }
        Some(_) => {}
    }

    match app.ask(question).await {
        Ok(Some(reply)) => println!("{}", render(&reply)),
        Ok(None) => {}
        Err(err) => println!("{}", err),
    }
}

fn print_documents(app: &App) {
    let documents = app.documents();
    if documents.is_empty() {
        println!("no documents");
        return;
    }
    for doc in documents {
        match (doc.collection_name, doc.vectors_count) {
            (Some(name), Some(count)) => {
                println!("  {} [{}] {} vectors", doc.display_name, name, count)
            }
            _ => println!("  {} [local only]", doc.display_name),
        }
    }
}

fn print_history(app: &App) {
    let Some(session) = app.session() else {
        println!("no document open");
        return;
    };
    let (asked, answered) = role_counts(session.messages());
    println!(
        "-- {} ({} questions, {} replies)",
        session.display_name(),
        asked,
        answered
    );
    for message in session.messages() {
        let who = match message.role {
            Role::User => "you",
            Role::Assistant => "rag",
        };
        println!("{}> {}", who, render(message));
    }
}

fn render(message: &ChatMessage) -> String {
    if message.pages.is_empty() {
        return message.content.clone();
    }
    let pages: Vec<String> = message.pages.iter().map(u32::to_string).collect();
    format!("{} (pages {})", message.content, pages.join(", "))
}

/// Counts (questions, replies) in a conversation.
fn role_counts(messages: &[ChatMessage]) -> (usize, usize) {
    messages.iter().fold((0, 0), |(user, assistant), m| match m.role {
        Role::User => (user + 1, assistant),
        Role::Assistant => (user, assistant + 1),
    })
}
