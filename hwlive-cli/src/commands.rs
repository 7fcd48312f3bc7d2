//! Command implementations

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use colored::Colorize;
use log::{info, warn};

use hwlive_core::differ::{create_plan, destroy_plan};
use hwlive_core::effect::Effect;
use hwlive_core::interpreter::{EffectOutcome, Interpreter};
use hwlive_core::plan::Plan;
use hwlive_core::provider::Provider;
use hwlive_core::resource::{Resource, ResourceId, State, Value};
use hwlive_core::schema::SchemaKind;
use hwlive_provider::LiveProvider;
use hwlive_provider::config::Timeouts;
use hwlive_state::{BackendConfig, LockInfo, StateBackend, StateFile, create_backend};

use crate::config::{self, ParsedConfig, apply_default_region, get_schemas};
use crate::display::{format_effect, print_plan};

/// Slack on top of the provider timeouts for request retries
const LOCK_MARGIN_SECS: u64 = 5 * 60;

pub fn run_validate(file: &Path) -> Result<(), String> {
    let parsed = config::load(file)?;

    println!("{}", "Validating...".cyan());

    config::validate(&parsed)?;

    let count = parsed.resources.len() + parsed.data.len();
    println!(
        "{}",
        format!("✓ {} blocks validated successfully.", count)
            .green()
            .bold()
    );

    for resource in parsed.all_blocks() {
        println!("  • {}", resource.id);
    }

    Ok(())
}

pub async fn run_plan(file: &Path) -> Result<(), String> {
    let (parsed, provider) = load_with_provider(file)?;
    let backend = open_backend(&parsed.backend).await?;
    let state_file = read_state(backend.as_ref()).await?;

    if !parsed.data.is_empty() {
        println!("{}", "Data sources:".cyan().bold());
        for resource in &parsed.data {
            let state = provider
                .read_data_source(resource)
                .await
                .map_err(|e| e.to_string())?;
            println!("  {} {} ({})", "<=".cyan().bold(), resource.id, describe_read(&state));
        }
        println!();
    }

    let refreshed = refresh_all(&provider, &state_file).await?;
    let plan = plan_resources(&parsed.resources, &refreshed);
    print_plan(&plan, &get_schemas());
    Ok(())
}

pub async fn run_apply(file: &Path, auto_approve: bool) -> Result<(), String> {
    let (parsed, provider) = load_with_provider(file)?;
    let backend = open_backend(&parsed.backend).await?;
    let lock = acquire_lock(backend.as_ref(), "apply").await?;
    let result = apply_locked(&parsed, provider, backend.as_ref(), &lock, auto_approve).await;
    finish_locked(backend.as_ref(), &lock, result).await
}

async fn apply_locked(
    parsed: &ParsedConfig,
    provider: LiveProvider,
    backend: &dyn StateBackend,
    lock: &LockInfo,
    auto_approve: bool,
) -> Result<(), String> {
    let mut state_file = read_state(backend).await?;

    let refreshed = refresh_all(&provider, &state_file).await?;
    if record_refreshed(&mut state_file, &refreshed, provider.name()) {
        persist(backend, &mut state_file).await?;
    }

    let desired: Vec<Resource> = parsed.all_blocks().cloned().collect();
    let plan = plan_resources(&desired, &refreshed);

    if !plan.has_changes() {
        println!("{}", "No changes needed.".green());
        return Ok(());
    }

    check_protected(&plan, &state_file)?;

    print_plan(&plan, &get_schemas());
    println!();

    if !auto_approve && !confirm("Do you want to apply these changes?")? {
        println!("{}", "Apply cancelled.".yellow());
        return Ok(());
    }

    println!("{}", "Applying changes...".cyan().bold());
    println!();

    let provider_name = provider.name();
    let lease = effect_lease(&provider.config().timeouts);
    let interpreter = Interpreter::new(provider);
    let mut success_count = 0;
    let mut failure_count = 0;

    for effect in plan.effects() {
        renew_lock(backend, lock, lease).await?;
        match interpreter.execute(effect).await {
            Ok(outcome) => {
                println!("  {} {}", "✓".green(), format_effect(effect));
                if let EffectOutcome::Read { state } = &outcome {
                    println!("      {}", describe_read(state));
                }
                success_count += 1;
                if record_outcome(&mut state_file, &outcome, provider_name) {
                    persist(backend, &mut state_file).await?;
                }
            }
            Err(e) => {
                println!("  {} {} - {}", "✗".red(), format_effect(effect), e);
                failure_count += 1;
                if let Effect::Replace { from, .. } = effect {
                    // The delete half may have gone through
                    match interpreter.provider().refresh(from).await {
                        Ok(state) => {
                            state_file.record(&state, provider_name);
                            persist(backend, &mut state_file).await?;
                        }
                        Err(e) => warn!("Could not re-read {} after failure: {}", from.id, e),
                    }
                }
                break;
            }
        }
    }

    println!();
    if failure_count == 0 {
        println!(
            "{}",
            format!("Apply complete! {} changes applied.", success_count)
                .green()
                .bold()
        );
        Ok(())
    } else {
        let skipped = plan.effects().len() - success_count - failure_count;
        println!(
            "{}",
            format!(
                "Apply failed. {} succeeded, {} failed, {} skipped.",
                success_count, failure_count, skipped
            )
            .red()
            .bold()
        );
        Err("apply did not complete".to_string())
    }
}

pub async fn run_destroy(file: &Path, auto_approve: bool) -> Result<(), String> {
    let (parsed, provider) = load_with_provider(file)?;
    let backend = open_backend(&parsed.backend).await?;
    let lock = acquire_lock(backend.as_ref(), "destroy").await?;
    let result = destroy_locked(provider, backend.as_ref(), &lock, auto_approve).await;
    finish_locked(backend.as_ref(), &lock, result).await
}

async fn destroy_locked(
    provider: LiveProvider,
    backend: &dyn StateBackend,
    lock: &LockInfo,
    auto_approve: bool,
) -> Result<(), String> {
    let mut state_file = read_state(backend).await?;

    let refreshed = refresh_all(&provider, &state_file).await?;
    if record_refreshed(&mut state_file, &refreshed, provider.name()) {
        persist(backend, &mut state_file).await?;
    }

    let (protected, deletable): (Vec<State>, Vec<State>) = refreshed
        .into_iter()
        .filter(|s| s.exists)
        .partition(|s| state_file.find(&s.id).is_some_and(|r| r.protected));

    for state in &protected {
        println!("{} {} is protected and will be kept.", "!".yellow().bold(), state.id);
    }

    let plan = destroy_plan(&deletable);
    if plan.is_empty() {
        println!("{}", "No resources to destroy.".green());
        return Ok(());
    }

    println!("{}", "Destroy Plan:".red().bold());
    println!();
    for effect in plan.effects() {
        println!("  {} {}", "-".red().bold(), effect.resource_id());
    }
    println!();
    println!("Plan: {} to destroy.", plan.effects().len().to_string().red());
    println!();

    if !auto_approve {
        println!("{}", "This action cannot be undone.".yellow());
        if !confirm("Do you really want to destroy all channels?")? {
            println!("{}", "Destroy cancelled.".yellow());
            return Ok(());
        }
    }

    println!("{}", "Destroying channels...".red().bold());
    println!();

    let provider_name = provider.name();
    let lease = effect_lease(&provider.config().timeouts);
    let interpreter = Interpreter::new(provider);
    let mut success_count = 0;
    let mut failure_count = 0;

    for effect in plan.effects() {
        renew_lock(backend, lock, lease).await?;
        match interpreter.execute(effect).await {
            Ok(outcome) => {
                println!("  {} {}", "✓".green(), format_effect(effect));
                success_count += 1;
                if record_outcome(&mut state_file, &outcome, provider_name) {
                    persist(backend, &mut state_file).await?;
                }
            }
            Err(e) => {
                println!("  {} {} - {}", "✗".red(), format_effect(effect), e);
                failure_count += 1;
            }
        }
    }

    println!();
    if failure_count == 0 {
        println!(
            "{}",
            format!("Destroy complete! {} channels destroyed.", success_count)
                .green()
                .bold()
        );
        Ok(())
    } else {
        println!(
            "{}",
            format!(
                "Destroy failed. {} succeeded, {} failed.",
                success_count, failure_count
            )
            .red()
            .bold()
        );
        Err("destroy did not complete".to_string())
    }
}

pub async fn run_import(file: &Path, address: &str, identifier: &str) -> Result<(), String> {
    let id = parse_address(address)?;
    let schemas = get_schemas();
    match schemas.get(&id.resource_type) {
        Some(schema) if schema.kind == SchemaKind::Managed => {}
        Some(_) => return Err(format!("{} is a data source and cannot be imported", id)),
        None => return Err(format!("Unknown resource type '{}'", id.resource_type)),
    }

    let (parsed, provider) = load_with_provider(file)?;
    let backend = open_backend(&parsed.backend).await?;
    let lock = acquire_lock(backend.as_ref(), "import").await?;

    let result = import_locked(&parsed, &provider, backend.as_ref(), file, &id, identifier).await;
    finish_locked(backend.as_ref(), &lock, result).await
}

async fn import_locked(
    parsed: &ParsedConfig,
    provider: &LiveProvider,
    backend: &dyn StateBackend,
    file: &Path,
    id: &ResourceId,
    identifier: &str,
) -> Result<(), String> {
    let mut state_file = read_state(backend).await?;
    if state_file.find(id).is_some() {
        return Err(format!("{} is already managed", id));
    }

    let state = provider
        .import(id, identifier)
        .await
        .map_err(|e| e.to_string())?;
    if !state.exists {
        return Err(format!("Channel {} not found", identifier));
    }

    state_file.record(&state, provider.name());
    persist(backend, &mut state_file).await?;
    info!("imported {} as {}", identifier, id);

    println!("  {} Import {} ({})", "✓".green(), id, identifier);
    if !parsed.resources.iter().any(|r| &r.id == id) {
        println!(
            "{}",
            format!(
                "{} is not declared in {}; the next apply will destroy it.",
                id,
                file.display()
            )
            .yellow()
        );
    }
    Ok(())
}

pub async fn run_refresh(file: &Path) -> Result<(), String> {
    let (parsed, provider) = load_with_provider(file)?;
    let backend = open_backend(&parsed.backend).await?;
    let lock = acquire_lock(backend.as_ref(), "refresh").await?;

    let result = refresh_locked(&provider, backend.as_ref()).await;
    finish_locked(backend.as_ref(), &lock, result).await
}

async fn refresh_locked(provider: &LiveProvider, backend: &dyn StateBackend) -> Result<(), String> {
    let mut state_file = read_state(backend).await?;
    if state_file.resources.is_empty() {
        println!("{}", "No resources in state.".green());
        return Ok(());
    }

    let refreshed = refresh_all(provider, &state_file).await?;
    for state in &refreshed {
        if state.exists {
            println!("  {} Refreshed {}", "✓".green(), state.id);
        } else {
            println!(
                "  {} {} no longer exists, removed from state",
                "-".red().bold(),
                state.id
            );
        }
    }

    if record_refreshed(&mut state_file, &refreshed, provider.name()) {
        persist(backend, &mut state_file).await?;
    }
    Ok(())
}

pub async fn run_read(file: &Path, address: &str) -> Result<(), String> {
    let id = parse_address(address)?;
    let (parsed, provider) = load_with_provider(file)?;
    let resource = parsed
        .find_data(&id)
        .ok_or_else(|| format!("No data source {} in {}", id, file.display()))?;

    let state = provider
        .read_data_source(resource)
        .await
        .map_err(|e| e.to_string())?;
    let json = Value::Map(state.attributes).to_json();
    let text = serde_json::to_string_pretty(&json).map_err(|e| e.to_string())?;
    println!("{}", text);
    Ok(())
}

pub async fn run_state_list(file: &Path) -> Result<(), String> {
    let backend = open_backend(&config::load_backend(file)?).await?;
    let state_file = read_state(backend.as_ref()).await?;

    if state_file.resources.is_empty() {
        println!("{}", "No resources in state.".yellow());
        return Ok(());
    }

    for resource in &state_file.resources {
        let identifier = resource.identifier.as_deref().unwrap_or("-");
        let marker = if resource.protected { " (protected)" } else { "" };
        println!("{}  {}{}", resource.id(), identifier.dimmed(), marker.yellow());
    }
    Ok(())
}

pub async fn run_state_show(file: &Path, address: &str) -> Result<(), String> {
    let id = parse_address(address)?;
    let backend = open_backend(&config::load_backend(file)?).await?;
    let state_file = read_state(backend.as_ref()).await?;

    let resource = state_file
        .find(&id)
        .ok_or_else(|| format!("{} is not in state", id))?;
    let text = serde_json::to_string_pretty(resource).map_err(|e| e.to_string())?;
    println!("{}", text);
    Ok(())
}

pub async fn run_state_protect(file: &Path, address: &str, protected: bool) -> Result<(), String> {
    let id = parse_address(address)?;
    let backend = open_backend(&config::load_backend(file)?).await?;
    let lock = acquire_lock(backend.as_ref(), "state").await?;

    let result = protect_locked(backend.as_ref(), &id, protected).await;
    finish_locked(backend.as_ref(), &lock, result).await
}

async fn protect_locked(
    backend: &dyn StateBackend,
    id: &ResourceId,
    protected: bool,
) -> Result<(), String> {
    let mut state_file = read_state(backend).await?;
    let resource = state_file
        .find(id)
        .cloned()
        .ok_or_else(|| format!("{} is not in state", id))?;
    if resource.protected == protected {
        return Ok(());
    }
    state_file.upsert(resource.with_protected(protected));
    persist(backend, &mut state_file).await?;
    let verb = if protected { "Protected" } else { "Unprotected" };
    println!("  {} {} {}", "✓".green(), verb, id);
    Ok(())
}

pub async fn run_force_unlock(file: &Path, lock_id: &str) -> Result<(), String> {
    let backend = open_backend(&config::load_backend(file)?).await?;
    backend
        .force_unlock(lock_id)
        .await
        .map_err(|e| e.to_string())?;
    println!("{}", format!("Lock {} removed.", lock_id).green());
    Ok(())
}

fn parse_address(address: &str) -> Result<ResourceId, String> {
    ResourceId::parse(address)
        .ok_or_else(|| format!("Invalid address '{}': expected <type>.<name>", address))
}

/// Load and validate a configuration file, then build the provider it names
fn load_with_provider(file: &Path) -> Result<(ParsedConfig, LiveProvider), String> {
    let mut parsed = config::load(file)?;
    config::validate(&parsed)?;

    let mut provider_config = parsed.provider.clone();
    provider_config.apply_env().map_err(|e| e.to_string())?;
    let provider = LiveProvider::new(provider_config)
        .map_err(|e| format!("Invalid provider configuration: {}", e))?;

    apply_default_region(&mut parsed, &provider.config().region);
    Ok((parsed, provider))
}

async fn open_backend(config: &BackendConfig) -> Result<Box<dyn StateBackend>, String> {
    let backend = create_backend(config).map_err(|e| e.to_string())?;
    backend.init().await.map_err(|e| e.to_string())?;
    Ok(backend)
}

async fn read_state(backend: &dyn StateBackend) -> Result<StateFile, String> {
    Ok(backend
        .read_state()
        .await
        .map_err(|e| e.to_string())?
        .unwrap_or_default())
}

async fn persist(backend: &dyn StateBackend, state_file: &mut StateFile) -> Result<(), String> {
    state_file.increment_serial();
    backend
        .write_state(state_file)
        .await
        .map_err(|e| format!("Failed to save state: {}", e))
}

async fn acquire_lock(backend: &dyn StateBackend, operation: &str) -> Result<LockInfo, String> {
    backend
        .acquire_lock(operation)
        .await
        .map_err(|e| e.to_string())
}

/// Longest time one effect may run: a Replace deletes, then creates
fn effect_lease(timeouts: &Timeouts) -> chrono::Duration {
    let longest = (timeouts.create.saturating_add(timeouts.delete))
        .max(timeouts.update)
        .saturating_add(LOCK_MARGIN_SECS);
    let secs = i64::try_from(longest).unwrap_or(i64::MAX);
    chrono::Duration::seconds(secs.min(i64::MAX / 1000))
}

/// Push the lock's expiry past the next effect
async fn renew_lock(
    backend: &dyn StateBackend,
    lock: &LockInfo,
    lease: chrono::Duration,
) -> Result<(), String> {
    backend
        .renew_lock(lock, lease)
        .await
        .map(|_| ())
        .map_err(|e| format!("Lost state lock {}: {}", lock.id, e))
}

/// Release the lock, keeping the command's own error if both fail
async fn finish_locked(
    backend: &dyn StateBackend,
    lock: &LockInfo,
    result: Result<(), String>,
) -> Result<(), String> {
    let released = backend.release_lock(lock).await;
    match (result, released) {
        (Err(e), Err(release_error)) => {
            warn!("Failed to release lock {}: {}", lock.id, release_error);
            Err(e)
        }
        (Err(e), Ok(())) => Err(e),
        (Ok(()), Err(release_error)) => Err(format!(
            "Failed to release lock {}: {}",
            lock.id, release_error
        )),
        (Ok(()), Ok(())) => Ok(()),
    }
}

/// Re-read every recorded resource, in state order
async fn refresh_all(provider: &LiveProvider, state_file: &StateFile) -> Result<Vec<State>, String> {
    let mut refreshed = Vec::new();
    for state in state_file.states() {
        let current = provider
            .refresh(&state)
            .await
            .map_err(|e| format!("Failed to refresh {}: {}", state.id, e))?;
        refreshed.push(current);
    }
    Ok(refreshed)
}

/// Record refreshed states; returns whether the state file changed
fn record_refreshed(state_file: &mut StateFile, refreshed: &[State], provider_name: &str) -> bool {
    let before = state_file.resources.clone();
    for state in refreshed {
        state_file.record(state, provider_name);
    }
    state_file.resources != before
}

fn plan_resources(desired: &[Resource], refreshed: &[State]) -> Plan {
    let current: HashMap<ResourceId, State> = refreshed
        .iter()
        .filter(|s| s.exists)
        .map(|s| (s.id.clone(), s.clone()))
        .collect();
    create_plan(desired, &current, &get_schemas())
}

/// Refuse plans that would delete a protected resource
fn check_protected(plan: &Plan, state_file: &StateFile) -> Result<(), String> {
    let blocked: Vec<String> = plan
        .effects()
        .iter()
        .filter(|e| matches!(e, Effect::Delete { .. } | Effect::Replace { .. }))
        .map(Effect::resource_id)
        .filter(|id| state_file.find(id).is_some_and(|r| r.protected))
        .map(ToString::to_string)
        .collect();

    if blocked.is_empty() {
        Ok(())
    } else {
        Err(format!(
            "The plan would delete protected resources: {}",
            blocked.join(", ")
        ))
    }
}

/// Apply an outcome to the state file; returns whether it changed
fn record_outcome(state_file: &mut StateFile, outcome: &EffectOutcome, provider_name: &str) -> bool {
    match outcome {
        EffectOutcome::Created { state }
        | EffectOutcome::Updated { state }
        | EffectOutcome::Replaced { state } => {
            state_file.record(state, provider_name);
            true
        }
        EffectOutcome::Deleted { id } => state_file.remove(id).is_some(),
        EffectOutcome::Read { .. } | EffectOutcome::Skipped { .. } => false,
    }
}

fn describe_read(state: &State) -> String {
    match state.attributes.get("channels").and_then(Value::as_list) {
        Some(channels) => format!("{} channels", channels.len()),
        None => "no channels".to_string(),
    }
}

fn confirm(question: &str) -> Result<bool, String> {
    println!("{}", question.yellow().bold());
    println!("  {}", "Only 'yes' will be accepted to approve.".yellow());
    print!("\n  Enter a value: ");
    std::io::stdout().flush().map_err(|e| e.to_string())?;

    let mut input = String::new();
    std::io::stdin()
        .read_line(&mut input)
        .map_err(|e| e.to_string())?;
    println!();
    Ok(input.trim() == "yes")
}
