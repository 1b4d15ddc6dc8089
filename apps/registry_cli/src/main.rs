use std::{
    io::{self, BufRead, Write},
    sync::Arc,
    time::Duration,
};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use client_core::{
    load_settings, ClientEvent, DocumentDraft, DocumentRegistry, ListView, LoggingNavigator,
    MutationFailure, MutationOutcome, NotificationLevel, PageSize, SortColumn,
};
use shared::domain::{DocumentId, Estado};
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "arkive", about = "Document registry client")]
struct Cli {
    /// Registry API base url (overrides arkive.toml and environment)
    #[arg(long, global = true)]
    api_base_url: Option<String>,
    /// Status webhook url
    #[arg(long, global = true)]
    webhook_url: Option<String>,
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List documents, optionally filtered by author and status
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 10)]
        size: u32,
        #[arg(long)]
        autor: Option<String>,
        #[arg(long)]
        estado: Option<Estado>,
        #[arg(long, value_enum)]
        sort: Option<SortArg>,
        #[arg(long, requires = "sort")]
        desc: bool,
    },
    Show {
        id: i64,
    },
    Create {
        #[arg(long)]
        titulo: String,
        #[arg(long)]
        autor: String,
        #[arg(long)]
        tipo: String,
        #[arg(long, default_value = "Registrado")]
        estado: String,
    },
    Update {
        id: i64,
        #[arg(long)]
        titulo: Option<String>,
        #[arg(long)]
        autor: Option<String>,
        #[arg(long)]
        tipo: Option<String>,
        #[arg(long)]
        estado: Option<String>,
    },
    Delete {
        id: i64,
        /// Skip the interactive confirmation
        #[arg(long)]
        yes: bool,
    },
    /// Ask the status webhook to move a document to another status
    Status {
        id: i64,
        estado: Estado,
        #[arg(long)]
        yes: bool,
    },
    Health,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SortArg {
    Id,
    Titulo,
    Autor,
    Tipo,
    Estado,
    Fecha,
}

impl From<SortArg> for SortColumn {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Id => SortColumn::Id,
            SortArg::Titulo => SortColumn::Titulo,
            SortArg::Autor => SortColumn::Autor,
            SortArg::Tipo => SortColumn::Tipo,
            SortArg::Estado => SortColumn::Estado,
            SortArg::Fecha => SortColumn::FechaRegistro,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();
    let cli = Cli::parse();

    let mut settings = load_settings()?;
    if let Some(url) = cli.api_base_url {
        settings.api_base_url = url;
    }
    if let Some(url) = cli.webhook_url {
        settings.webhook_url = url;
    }
    if let Some(secs) = cli.timeout_secs.filter(|secs| *secs > 0) {
        settings.request_timeout = Duration::from_secs(secs);
    }
    settings.validate()?;
    info!(api = %settings.api_base_url, "using registry api");

    let navigator = Arc::new(LoggingNavigator::default());
    let registry = DocumentRegistry::from_settings(&settings, navigator.clone())?;
    let mut events = registry.subscribe_events();

    match cli.command {
        Command::List {
            page,
            size,
            autor,
            estado,
            sort,
            desc,
        } => {
            let page_size = PageSize::try_from(size)
                .map_err(|size| anyhow!("page size must be 10, 20 or 50, got {size}"))?;
            registry.set_page_size(page_size).await;
            registry.set_draft_autor(autor.unwrap_or_default()).await;
            registry.set_draft_estado(estado).await;
            registry.apply_filters().await;
            if let Some(sort) = sort {
                registry.toggle_sort(sort.into()).await;
                if desc {
                    registry.toggle_sort(sort.into()).await;
                }
            }

            let mut view = registry.settle_list().await;
            if page > 1 {
                registry.set_page(page).await;
                view = registry.settle_list().await;
            }
            if let Some(err) = &view.error {
                bail!("no se pudo cargar el listado: {err}");
            }
            print_list(&view);
        }
        Command::Show { id } => {
            let snapshot = registry.settle_document(DocumentId(id)).await;
            if let Some(err) = snapshot.error {
                bail!("{err}");
            }
            let doc = snapshot.data.context("document not loaded")?;
            println!("{}", serde_json::to_string_pretty(&*doc)?);
        }
        Command::Create {
            titulo,
            autor,
            tipo,
            estado,
        } => {
            let outcome = registry
                .create(&DocumentDraft::new(titulo, autor, tipo, estado))
                .await;
            print_notifications(&mut events);
            let doc = finish(outcome)?;
            println!("creado documento {} ({})", doc.id, navigator.current());
        }
        Command::Update {
            id,
            titulo,
            autor,
            tipo,
            estado,
        } => {
            let id = DocumentId(id);
            let snapshot = registry.settle_document(id).await;
            if let Some(err) = snapshot.error {
                bail!("{err}");
            }
            let current = snapshot.data.context("document not loaded")?;
            let base = DocumentDraft::from(&*current);
            let draft = DocumentDraft {
                titulo: titulo.unwrap_or(base.titulo),
                autor: autor.unwrap_or(base.autor),
                tipo: tipo.unwrap_or(base.tipo),
                estado: estado.unwrap_or(base.estado),
            };
            let outcome = registry.update(id, &draft).await;
            print_notifications(&mut events);
            let doc = finish(outcome)?;
            println!("{}", serde_json::to_string_pretty(&doc)?);
        }
        Command::Delete { id, yes } => {
            let id = DocumentId(id);
            registry.request_delete(id)?;
            if !yes && !confirm(&format!("¿Eliminar el documento {id}?"))? {
                registry.cancel_delete()?;
                println!("cancelado");
                return Ok(());
            }
            let outcome = registry.confirm_delete().await?;
            print_notifications(&mut events);
            finish(outcome)?;
        }
        Command::Status { id, estado, yes } => {
            let id = DocumentId(id);
            registry.request_status_change(id, estado)?;
            if !yes && !confirm(&format!("¿Cambiar el estado del documento {id} a {estado}?"))? {
                registry.cancel_status_change()?;
                println!("cancelado");
                return Ok(());
            }
            let outcome = registry.confirm_status_change().await?;
            print_notifications(&mut events);
            let transition = finish(outcome)?;
            println!(
                "documento {}: {} -> {}",
                transition.id, transition.anterior, transition.nuevo
            );
        }
        Command::Health => {
            let health = registry.health().await?;
            println!("{}", serde_json::to_string_pretty(&health)?);
        }
    }

    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [s/N] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(
        answer.trim().to_lowercase().as_str(),
        "s" | "si" | "sí" | "y" | "yes"
    ))
}

fn finish<T>(outcome: MutationOutcome<T>) -> Result<T> {
    match outcome {
        MutationOutcome::Ok(value) => Ok(value),
        MutationOutcome::Failed(failure) => Err(describe(failure)),
        MutationOutcome::Ignored => bail!("otra operación sobre este documento está en curso"),
    }
}

fn describe(failure: MutationFailure) -> anyhow::Error {
    if failure.fields.is_empty() {
        return anyhow!(failure.message);
    }
    let fields = failure
        .fields
        .iter()
        .map(|(field, message)| format!("  {field}: {message}"))
        .collect::<Vec<_>>()
        .join("\n");
    anyhow!("datos no válidos:\n{fields}")
}

fn print_notifications(events: &mut broadcast::Receiver<ClientEvent>) {
    while let Ok(event) = events.try_recv() {
        if let ClientEvent::Notification(notification) = event {
            match notification.level {
                NotificationLevel::Error => eprintln!("✗ {}", notification.message),
                NotificationLevel::Success => println!("✓ {}", notification.message),
                NotificationLevel::Info => println!("· {}", notification.message),
            }
        }
    }
}

fn print_list(view: &ListView) {
    println!(
        "{:>5}  {:<32}  {:<20}  {:<12}  {:<10}  {}",
        "ID", "TÍTULO", "AUTOR", "TIPO", "ESTADO", "REGISTRO"
    );
    if view.rows.is_empty() {
        println!("(sin resultados)");
    }
    for doc in &view.rows {
        println!(
            "{:>5}  {:<32}  {:<20}  {:<12}  {:<10}  {}",
            doc.id,
            truncate(&doc.titulo, 32),
            truncate(&doc.autor, 20),
            truncate(&doc.tipo, 12),
            doc.estado,
            doc.fecha_registro.format("%Y-%m-%d %H:%M"),
        );
    }
    println!(
        "página {} de {} · {} resultado(s) · {} por página",
        view.page,
        view.total_pages,
        view.total.unwrap_or(0),
        view.page_size
    );
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut out: String = text.chars().take(width.saturating_sub(1)).collect();
    out.push('…');
    out
}
