use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lead_sync::{
    export_many, load_lead, logging, to_external, EngineConfig, EnrichmentConfig,
    EnrichmentRouter, FieldMap, FieldMapResolver, HttpWebhookSender, IntegrationType, LeadLocks,
    Query, Repository, SqliteRepository, StatusOrchestrator, StatusPointsHook, StatusSettings,
    SyncEngine, Table, TimedSender, Transition, WebhookConfig, WriteOp,
};

const USAGE: &str = "usage:
  lead-sync init-db
  lead-sync import <field-maps|enrichment|webhooks|status-settings|score-settings|users|leads|accounts> <file.json>
  lead-sync project <tenant_id> <lead_id>
  lead-sync export <tenant_id> <integration_type> <out.csv>
  lead-sync transition <tenant_id> <lead_id> <disqualify|convert|STATUS> [reason]";

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = env::var("LEAD_SYNC_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("lead-sync.toml"));
    let config = EngineConfig::load(&config_path)?;
    logging::init(&config.log_filter, config.log_json);

    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("");

    match command {
        "init-db" => run_init(&config),
        "import" if args.len() == 4 => run_import(&config, &args[2], Path::new(&args[3])).await,
        "project" if args.len() == 4 => run_project(&config, &args[2], &args[3]).await,
        "export" if args.len() == 5 => {
            run_export(&config, &args[2], &args[3], Path::new(&args[4])).await
        }
        "transition" if args.len() == 5 || args.len() == 6 => {
            run_transition(&config, &args[2], &args[3], &args[4], args.get(5).cloned()).await
        }
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    }
}

fn open_repo(config: &EngineConfig) -> Result<Arc<dyn Repository>> {
    let repo = SqliteRepository::open(&config.database_path)
        .context(format!("Failed to open database: {:?}", config.database_path))?;
    Ok(Arc::new(repo))
}

fn run_init(config: &EngineConfig) -> Result<()> {
    println!("🔧 Setting up database...");
    open_repo(config)?;
    println!("✓ Database ready at {:?} (WAL mode)", config.database_path);
    Ok(())
}

fn read_documents(path: &Path) -> Result<Vec<Value>> {
    let content = fs::read_to_string(path)
        .context(format!("Failed to read import file: {:?}", path))?;
    let parsed: Value = serde_json::from_str(&content)
        .context(format!("Failed to parse JSON: {:?}", path))?;
    Ok(match parsed {
        Value::Array(items) => items,
        single => vec![single],
    })
}

async fn run_import(config: &EngineConfig, kind: &str, path: &Path) -> Result<()> {
    let repo = open_repo(config)?;
    let docs = read_documents(path)?;
    println!("📂 Importing {} {} from {:?}", docs.len(), kind, path);

    match kind {
        "field-maps" => {
            let resolver = FieldMapResolver::new(repo.clone());
            for doc in docs {
                let map: FieldMap = serde_json::from_value(doc).context("Invalid field map")?;
                let collisions = map.collisions();
                if !collisions.is_empty() {
                    println!("⚠️  {} {} maps several fields to {:?}", map.provider, map.object_kind, collisions);
                }
                resolver.save(&map).await?;
            }
        }
        "enrichment" => {
            let router = EnrichmentRouter::new(repo.clone());
            for doc in docs {
                let enrichment: EnrichmentConfig =
                    serde_json::from_value(doc).context("Invalid enrichment config")?;
                router.save_config(&enrichment).await?;
            }
        }
        "webhooks" => {
            let ops = validated::<WebhookConfig>(Table::Webhooks, docs, "webhook")?;
            repo.transact(ops).await?;
        }
        "status-settings" => {
            let ops = validated::<StatusSettings>(Table::StatusSettings, docs, "status settings")?;
            repo.transact(ops).await?;
        }
        "leads" => {
            let ops = validated::<lead_sync::CanonicalLead>(Table::Leads, docs, "lead")?;
            repo.transact(ops).await?;
        }
        "accounts" => {
            let ops = validated::<lead_sync::CanonicalAccount>(Table::Accounts, docs, "account")?;
            repo.transact(ops).await?;
        }
        "score-settings" | "users" => {
            let table = if kind == "users" { Table::Users } else { Table::ScoreSettings };
            let ops = docs
                .into_iter()
                .map(|object| WriteOp::Upsert { table, object })
                .collect();
            repo.transact(ops).await?;
        }
        other => bail!("Unknown import kind: {}\n{}", other, USAGE),
    }

    println!("✓ Import complete");
    Ok(())
}

/// Check every document deserializes before writing any of them
fn validated<T>(table: Table, docs: Vec<Value>, what: &str) -> Result<Vec<WriteOp>>
where
    T: serde::de::DeserializeOwned + serde::Serialize,
{
    docs.into_iter()
        .enumerate()
        .map(|(i, doc)| {
            let typed: T = serde_json::from_value(doc)
                .context(format!("Invalid {} at index {}", what, i))?;
            Ok(WriteOp::Upsert {
                table,
                object: serde_json::to_value(&typed)?,
            })
        })
        .collect()
}

async fn run_project(config: &EngineConfig, tenant_id: &str, lead_id: &str) -> Result<()> {
    let repo = open_repo(config)?;
    let lead = load_lead(repo.as_ref(), tenant_id, lead_id).await?;
    let map = FieldMapResolver::new(repo.clone())
        .resolve_for(tenant_id, lead.integration_type)
        .await?;

    let payload = Value::Object(to_external(&map, &lead));
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

async fn run_export(
    config: &EngineConfig,
    tenant_id: &str,
    integration_type: &str,
    out: &Path,
) -> Result<()> {
    let integration_type: IntegrationType = integration_type
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;
    let repo = open_repo(config)?;

    let lead_ids: Vec<String> = repo
        .fetch_all(Table::Leads, &Query::tenant(tenant_id))
        .await?
        .into_iter()
        .filter(|doc| {
            doc.get("integration_type")
                .and_then(Value::as_str)
                .and_then(|t| t.parse::<IntegrationType>().ok())
                .map_or(false, |t| t.base() == integration_type.base())
        })
        .filter_map(|doc| doc.get("id").and_then(Value::as_str).map(str::to_string))
        .collect();

    // Export never calls the CRM
    let engine = SyncEngine::new(repo, Arc::new(OfflineRpc), LeadLocks::new(), config.rpc_timeout());
    let file = fs::File::create(out).context(format!("Failed to create {:?}", out))?;

    println!("📤 Exporting {} leads...", lead_ids.len());
    let report = export_many(
        &engine,
        tenant_id,
        lead_ids,
        integration_type,
        file,
        config.bulk_concurrency,
    )
    .await?;

    println!("✓ Exported {} leads to {:?}", report.succeeded.len(), out);
    if !report.is_complete_success() {
        println!("{}", serde_json::to_string_pretty(&report.summary())?);
    }
    Ok(())
}

fn parse_transition(target: &str, reason: Option<String>) -> Transition {
    match target {
        "disqualify" => Transition::Disqualify { reason },
        "convert" => Transition::Convert,
        status => Transition::Update {
            status: status.to_string(),
        },
    }
}

async fn run_transition(
    config: &EngineConfig,
    tenant_id: &str,
    lead_id: &str,
    target: &str,
    reason: Option<String>,
) -> Result<()> {
    let transition = parse_transition(target, reason);
    let repo = open_repo(config)?;
    let webhooks = TimedSender::new(
        Arc::new(HttpWebhookSender::new(config.webhook_timeout())?),
        config.webhook_timeout(),
    );
    let orchestrator = StatusOrchestrator::new(
        repo.clone(),
        Arc::new(OfflineRpc),
        Arc::new(webhooks),
        Arc::new(StatusPointsHook::new(repo)),
        LeadLocks::new(),
        config.rpc_timeout(),
    );

    let outcome = orchestrator.transition(tenant_id, lead_id, transition).await?;
    println!(
        "✓ {} → {} ({} tasks stopped, score {})",
        outcome.previous_status.as_deref().unwrap_or("-"),
        outcome.lead.integration_status.as_deref().unwrap_or("-"),
        outcome.tasks_stopped,
        outcome.lead.score
    );
    Ok(())
}

/// RPC stand-in for commands that work on stored data only
struct OfflineRpc;

#[async_trait::async_trait]
impl lead_sync::IntegrationRpc for OfflineRpc {
    async fn call(
        &self,
        _tenant_id: &str,
        provider: lead_sync::Provider,
        operation: lead_sync::RpcOperation,
        _data: Value,
    ) -> lead_sync::Result<Value> {
        Err(lead_sync::SyncError::external(
            provider.as_str(),
            format!("{} is not available offline", operation),
        ))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use lead_sync::{IntegrationRpc, Provider, RpcOperation, SyncError};
    use serde_json::json;

    #[test]
    fn test_parse_transition() {
        assert_eq!(
            parse_transition("disqualify", Some("no budget".to_string())),
            Transition::Disqualify {
                reason: Some("no budget".to_string())
            }
        );
        assert_eq!(parse_transition("convert", None), Transition::Convert);
        assert_eq!(
            parse_transition("Working", None),
            Transition::Update {
                status: "Working".to_string()
            }
        );
    }

    #[test]
    fn test_validated_rejects_whole_batch_on_bad_document() {
        let good = json!({
            "tenant_id": "t1",
            "webhook_type": "convert",
            "object_type": "lead",
            "integration_status": "Converted",
            "url": "https://hooks.example.com"
        });
        let ops = validated::<WebhookConfig>(Table::Webhooks, vec![good.clone()], "webhook").unwrap();
        assert_eq!(ops.len(), 1);

        let bad = json!({"tenant_id": "t1", "webhook_type": "explode"});
        let err = validated::<WebhookConfig>(Table::Webhooks, vec![good, bad], "webhook").unwrap_err();
        assert!(err.to_string().contains("index 1"));
    }

    #[tokio::test]
    async fn test_offline_rpc_refuses_calls() {
        let err = OfflineRpc
            .call("t1", Provider::Hubspot, RpcOperation::UpdateContact, json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::ExternalCallFailure { .. }));
    }
}
