use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use labsheet_core::config::AppConfig;
use labsheet_core::export::batch_export;
use labsheet_core::form::FormContext;
use labsheet_core::gate;
use labsheet_core::renderer::HandlebarsRenderer;
use labsheet_core::session::Session;
use labsheet_core::storage::OpendalStore;
use labsheet_core::template::{FieldKind, Template};
use opendal::Operator;
use serde_json::{Map, Value};
use std::path::Path;

#[derive(Parser)]
#[command(name = "labsheet", about = "Template-driven lab record entry")]
struct Cli {
    /// Path to the JSON or YAML configuration file.
    #[arg(long, default_value = "config.json", env = "LABSHEET_CONFIG")]
    config: String,

    /// Directory holding `template_<name>.hbs` document templates.
    #[arg(long, default_value = "document_templates", env = "LABSHEET_DOCUMENTS")]
    documents: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List configured templates.
    Templates,
    /// Check whether an experiment code is still free.
    Check {
        #[arg(long)]
        template: String,
        #[arg(long)]
        key: String,
    },
    /// Fill a form from a JSON object of field values and submit it.
    Submit {
        #[arg(long)]
        template: String,
        /// JSON file with field values; table keys take arrays of row objects.
        #[arg(long)]
        record: String,
        #[arg(long)]
        operator: Option<String>,
        /// Also render the record into this directory.
        #[arg(long)]
        export_dir: Option<String>,
    },
    /// Render every stored row into one zip archive.
    Export {
        #[arg(long, default_value = ".")]
        output_dir: String,
    },
    /// Initialise the configured store.
    InitStore {
        #[arg(long, default_value = "Lab Data Sheet")]
        title: String,
    },
}

fn local_operator(dir: &Path) -> Result<Operator> {
    let root = dir
        .canonicalize()
        .with_context(|| format!("directory {} does not exist", dir.display()))?;
    let builder = opendal::services::Fs::default().root(&root.to_string_lossy());
    Ok(Operator::new(builder)?.finish())
}

async fn load_config(path: &str) -> Result<AppConfig> {
    let path = Path::new(path);
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let file = path
        .file_name()
        .and_then(|f| f.to_str())
        .ok_or_else(|| anyhow!("invalid config path {}", path.display()))?;
    AppConfig::load(&local_operator(dir)?, file).await
}

fn find_template<'a>(config: &'a AppConfig, template_type: &str) -> Result<&'a Template> {
    config
        .template(template_type)
        .ok_or_else(|| anyhow!("unknown template '{}'", template_type))
}

fn renderer(documents: &str) -> Result<HandlebarsRenderer> {
    Ok(HandlebarsRenderer::new(local_operator(Path::new(documents))?, ""))
}

async fn submit(
    cli: &Cli,
    config: &AppConfig,
    template_type: &str,
    record_path: &str,
    operator: Option<&str>,
    export_dir: Option<&str>,
) -> Result<()> {
    let template = find_template(config, template_type)?;
    let store = OpendalStore::from_uri(config.store_target()?)?;
    let input: Map<String, Value> = serde_json::from_slice(
        &tokio::fs::read(record_path)
            .await
            .with_context(|| format!("failed to read {}", record_path))?,
    )
    .with_context(|| format!("{} must hold a JSON object", record_path))?;

    let mut session = Session::new();
    if let Some(name) = operator {
        session.select_operator(config, name)?;
    }
    let ctx: FormContext = session.context(config, chrono::Local::now().date_naive());
    let form = session.open_form(template);

    for (key, value) in &input {
        if let Some(table) = template.table(key) {
            let rows = value
                .as_array()
                .ok_or_else(|| anyhow!("table '{}' expects an array of rows", key))?;
            for row in rows {
                let cells = row
                    .as_object()
                    .ok_or_else(|| anyhow!("rows of table '{}' must be objects", key))?;
                let index = form.add_row(template, &table.key)?;
                for (column, cell) in cells {
                    form.set_cell(template, &table.key, index, column, cell.clone())?;
                }
            }
            continue;
        }
        let field = template
            .field(key)
            .ok_or_else(|| anyhow!("template '{}' has no field '{}'", template_type, key))?;
        match (&field.kind, value) {
            (FieldKind::Text | FieldKind::Textarea, Value::String(text)) => {
                form.set_text(template, key, text)?
            }
            (FieldKind::Number { .. }, Value::Number(n)) => form.set_number(template, key, n.as_f64())?,
            (FieldKind::Number { .. }, Value::Null) => form.set_number(template, key, None)?,
            (FieldKind::Radio { .. }, Value::String(option)) => {
                form.select_option(template, key, option)?
            }
            (FieldKind::Autofill { .. }, _) => {
                tracing::warn!(field = %key, "ignoring value for autofill field");
            }
            (kind, other) => bail!("field '{}' ({}) cannot take {}", key, kind.name(), other),
        }
    }

    if form.record().contains_key(gate::KEY_COLUMN) || template.field(gate::KEY_COLUMN).is_some() {
        let check = form.check_key(&store, template).await?;
        tracing::info!(available = check.available, "{}", check.message);
    }

    let outcome = form.submit(&store, template, &ctx).await?;
    if !outcome.ok {
        bail!("{}", outcome.message);
    }
    tracing::info!(columns = ?outcome.added_columns, "{}", outcome.message);

    if let Some(dir) = export_dir {
        let renderer = renderer(&cli.documents)?;
        let (file_name, document) = form.export(template, &renderer).await?;
        if document.template_missing {
            tracing::warn!(template = %template.name, "no document template, nothing exported");
        } else {
            let target = Path::new(dir).join(&file_name);
            tokio::fs::write(&target, &document.bytes).await?;
            tracing::info!(path = %target.display(), "exported document");
        }
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli.config).await?;

    match &cli.command {
        Command::Templates => {
            for template in &config.templates {
                println!(
                    "{}\t{}\t{} fields\t{} tables",
                    template.template_type,
                    template.name,
                    template.fields.len(),
                    template.tables.len()
                );
            }
        }
        Command::Check { template, key } => {
            let template = find_template(&config, template)?;
            let store = OpendalStore::from_uri(config.store_target()?)?;
            let outcome = gate::check(&store, template.collection(), key).await;
            println!("{}", outcome.message);
            if !outcome.available {
                std::process::exit(2);
            }
        }
        Command::Submit {
            template,
            record,
            operator,
            export_dir,
        } => {
            submit(
                &cli,
                &config,
                template,
                record,
                operator.as_deref(),
                export_dir.as_deref(),
            )
            .await?
        }
        Command::Export { output_dir } => {
            let store = OpendalStore::from_uri(config.store_target()?)?;
            let renderer = renderer(&cli.documents)?;
            let today = chrono::Local::now().date_naive();
            let export = batch_export(&store, &config.templates, &renderer, today).await?;
            for skipped in &export.skipped {
                tracing::warn!(
                    collection = %skipped.collection,
                    row = skipped.row,
                    "skipped: {}",
                    skipped.reason
                );
            }
            if export.generated == 0 {
                tracing::warn!("no rows found to export");
                return Ok(());
            }
            let target = Path::new(output_dir).join(&export.file_name);
            tokio::fs::write(&target, &export.archive).await?;
            println!("{} documents written to {}", export.generated, target.display());
        }
        Command::InitStore { title } => {
            let store = OpendalStore::from_uri(config.store_target()?)?;
            let meta = store.create_spreadsheet(title).await?;
            println!("created store '{}' ({})", meta.title, meta.id);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        tracing::error!(error = %format!("{:#}", e), "command failed");
        std::process::exit(1);
    }
}
