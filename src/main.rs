use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;

use batch_apps::api::{BatchAppsApi, JobRef, PoolRef};
use batch_apps::auth::{AuthManager, AzureOAuth, Credentials, DEFAULT_REFRESH_THRESHOLD};
use batch_apps::config::cli::{ConfigAction, FilesAction, JobsAction, PoolsAction};
use batch_apps::config::{setup, CliArgs, Command, Configuration};
use batch_apps::files::FileManager;
use batch_apps::http_client::BatchAppsHttpClient;
use batch_apps::jobs::{JobFile, JobManager};
use batch_apps::logging;
use batch_apps::monitor::JobMonitor;
use batch_apps::pools::PoolManager;

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let args = CliArgs::parse();

    // Load configuration first (for log level)
    let mut config = Configuration::new(args.config_options())?;
    logging::init(&config);

    let needs_setup = !matches!(
        args.command,
        Command::Config {
            action: ConfigAction::Setup | ConfigAction::Clear
        }
    );
    if needs_setup && setup::needs_interactive_setup(&config) {
        setup::run_interactive_setup(&mut config)?;
    }

    match args.command {
        Command::Login {
            unattended,
            msa,
            prompt,
        } => login(&config, unattended || args.unattended, msa, prompt).await,
        Command::Logout => logout(&config, args.unattended).await,
        Command::Config { action } => run_config(&mut config, action),
        Command::Jobs { action } => {
            let api = connect(&config, args.unattended).await?;
            run_jobs(&config, api, action).await
        }
        Command::Files { action } => {
            let api = connect(&config, args.unattended).await?;
            run_files(api, action).await
        }
        Command::Pools { action } => {
            let api = connect(&config, args.unattended).await?;
            run_pools(api, action).await
        }
    }
}

/// Sign in and cache the token
async fn login(config: &Configuration, unattended: bool, msa: bool, prompt: bool) -> Result<()> {
    let creds = if unattended {
        tracing::info!("Signing in with the unattended account...");
        AzureOAuth::get_unattended_session(config).await?
    } else {
        let (url, state) = AzureOAuth::get_authorization_url(config, msa, prompt, &[])?;
        println!();
        println!("Open the following URL in a browser and sign in:");
        println!();
        println!("  {}", url);
        println!();
        let redirect: String = dialoguer::Input::new()
            .with_prompt("Paste the URL you were redirected to")
            .interact_text()
            .context("Failed to read redirect URL")?;
        AzureOAuth::get_authorization_token(config, redirect.trim(), Some(&state)).await?
    };

    println!(
        "Signed in. Token expires in {} seconds.",
        creds.token().expires_in()
    );
    Ok(())
}

async fn logout(config: &Configuration, unattended: bool) -> Result<()> {
    let creds = stored_session(config, unattended)?;
    let auth = AuthManager::new(creds, DEFAULT_REFRESH_THRESHOLD)?;
    if auth.clear_auth().await? {
        println!("Stored credentials removed");
    } else {
        println!("No stored credentials found");
    }
    Ok(())
}

fn stored_session(config: &Configuration, unattended: bool) -> Result<Credentials> {
    let creds = if unattended {
        AzureOAuth::get_stored_unattended_session(config)
    } else {
        AzureOAuth::get_session(config)
    };
    creds.context("No session found, run `batch-apps login` first")
}

/// Build the API client for a signed-in session
async fn connect(config: &Configuration, unattended: bool) -> Result<Arc<BatchAppsApi>> {
    let creds = match stored_session(config, unattended) {
        Ok(creds) => creds,
        Err(_) if unattended => AzureOAuth::get_unattended_session(config).await?,
        Err(e) => return Err(e),
    };

    let auth = Arc::new(AuthManager::new(creds, DEFAULT_REFRESH_THRESHOLD)?);
    let http = BatchAppsHttpClient::with_defaults(auth)?;
    let api = BatchAppsApi::new(http, config)?;
    tracing::debug!("Connected to {}", config.endpoint()?);
    Ok(Arc::new(api))
}

fn run_config(config: &mut Configuration, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            println!("Config file: {}", config.config_file().display());
            println!("Endpoint:    {}", config.endpoint().unwrap_or_default());
            println!("Log level:   {}", config.logging_level()?);
            println!("Job types:   {}", config.list_jobtypes()?.join(", "));
            println!();
            println!("[{}]", config.current_jobtype());
            for (key, value) in config.default_params() {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::SetEndpoint { endpoint } => {
            let endpoint = config.set_endpoint(&endpoint)?;
            config.save_config();
            println!("Endpoint set to {}", endpoint);
        }
        ConfigAction::SetJobtype { jobtype, default } => {
            config.set_current_jobtype(&jobtype)?;
            if default {
                config.set_default_jobtype();
            }
            println!("Job type set to {}", config.current_jobtype());
        }
        ConfigAction::Set { param, value } => {
            config.set(&param, &value)?;
            config.save_config();
        }
        ConfigAction::Remove { setting } => {
            if config.remove(&setting) {
                config.save_config();
                println!("Removed {}", setting);
            } else {
                println!("Nothing removed for {}", setting);
            }
        }
        ConfigAction::Setup => setup::run_interactive_setup(config)?,
        ConfigAction::Clear => {
            if config.clear_config() {
                println!("Configuration restored to defaults");
            }
        }
    }
    Ok(())
}

async fn run_jobs(config: &Configuration, api: Arc<BatchAppsApi>, action: JobsAction) -> Result<()> {
    let mut manager = JobManager::new(Arc::clone(&api), config);

    match action {
        JobsAction::List {
            index,
            per_call,
            name,
        } => {
            let jobs = manager.get_jobs(index, per_call, name.as_deref()).await?;
            for job in &jobs {
                println!(
                    "{}  {:<12} {:>4}%  {}",
                    job.id,
                    job.status,
                    job.percentage.as_deref().unwrap_or("0"),
                    job.name
                );
            }
            println!("Showing {} of {} jobs", jobs.len(), manager.count().unwrap_or(0));
        }
        JobsAction::Show { id } => {
            let job = manager.get_job(&JobRef::Id(id)).await?;
            println!("Id:        {}", job.id);
            println!("Name:      {}", job.name);
            println!("Type:      {}", job.job_type);
            println!("Status:    {}", job.status);
            println!("Progress:  {}%", job.percentage.as_deref().unwrap_or("0"));
            println!("Tasks:     {}", job.number_tasks);
            println!("Submitted: {}", job.time_submitted.as_deref().unwrap_or("-"));
            println!("Completed: {}", job.time_completed.as_deref().unwrap_or("-"));
            if let Some(pool) = &job.pool_id {
                println!("Pool:      {}", pool);
            }
        }
        JobsAction::Submit {
            name,
            files,
            dir,
            job_file,
            params,
            instances,
            pool,
            threads,
        } => {
            let file_manager = FileManager::new(Arc::clone(&api));
            let mut collection =
                file_manager.create_file_set(files.iter().map(|p| file_manager.create_file(p)));
            if let Some(dir) = dir {
                collection.extend(&file_manager.files_from_dir(&dir, false, "*")?);
            }

            let mut job = manager.create_job(&name);
            for (key, value) in params {
                job.set_param(&key, value);
            }
            if let Some(instances) = instances {
                job.instances = instances;
            }
            job.pool = pool;

            let job_file = match job_file {
                Some(file_name) => {
                    let index = collection
                        .iter()
                        .position(|f| f.name() == file_name)
                        .with_context(|| format!("Job file {} is not among the job's files", file_name))?;
                    Some(JobFile::Index(index))
                }
                None if !collection.is_empty() => Some(JobFile::Index(0)),
                None => None,
            };
            job.add_file_collection(Some(collection));
            if let Some(job_file) = job_file {
                job.set_job_file(job_file)?;
            }

            let submitted = manager.submit(&job, threads).await?;
            println!("Submitted job {}", submitted.id);
            if let Some(link) = submitted.link {
                println!("{}", link);
            }
        }
        JobsAction::Cancel { id } => {
            let mut job = manager.get_job(&JobRef::Id(id)).await?;
            if job.cancel().await? {
                println!("Job {} is {}", job.id, job.status);
            } else {
                println!("Job {} could not be cancelled", job.id);
            }
        }
        JobsAction::Reprocess { id } => {
            let job = manager.get_job(&JobRef::Id(id)).await?;
            if job.reprocess().await? {
                println!("Reprocessing failed tasks of job {}", job.id);
            } else {
                println!("Job {} has nothing to reprocess", job.id);
            }
        }
        JobsAction::Logs {
            id,
            since,
            max_lines,
        } => {
            let job = manager.get_job(&JobRef::Id(id)).await?;
            if let Some(log) = job.get_logs(since.as_deref(), Some(max_lines)).await {
                for message in &log.messages {
                    println!(
                        "{} [task {}] {}",
                        message.timestamp.as_deref().unwrap_or("-"),
                        message.task_id.as_deref().unwrap_or("-"),
                        message.text
                    );
                }
            }
        }
        JobsAction::Outputs { id } => {
            let job = manager.get_job(&JobRef::Id(id)).await?;
            for output in job.list_all_outputs().await? {
                println!(
                    "{:<12} {}",
                    output.kind.as_deref().unwrap_or("-"),
                    output.name.as_deref().unwrap_or("-")
                );
            }
        }
        JobsAction::Download { id, dir, overwrite } => {
            let job = manager.get_job(&JobRef::Id(id)).await?;
            let path = job.get_output(&dir, None, overwrite).await?;
            println!("Downloaded {}", path.display());
        }
        JobsAction::Thumbnail { id, dir, filename } => {
            let job = manager.get_job(&JobRef::Id(id)).await?;
            let path = job
                .get_thumbnail(dir.as_deref(), filename.as_deref(), true)
                .await?;
            println!("Downloaded {}", path.display());
        }
        JobsAction::Tasks { id } => {
            let mut job = manager.get_job(&JobRef::Id(id)).await?;
            for task in job.get_tasks().await? {
                println!(
                    "{:>4}  {:<12} {}",
                    task.id,
                    task.status.as_deref().unwrap_or("-"),
                    task.completion_time.as_deref().unwrap_or("-")
                );
            }
        }
        JobsAction::Watch {
            id,
            interval,
            timeout,
            download,
        } => {
            let mut job = manager.get_job(&JobRef::Id(id)).await?;
            let mut monitor =
                JobMonitor::new(Duration::from_secs(interval), Duration::from_secs(timeout));
            if let Some(dir) = download {
                monitor = monitor.with_downloads(dir);
            }
            monitor
                .watch(&mut job, |job| {
                    println!(
                        "{}: {} ({}%)",
                        job.name,
                        job.status,
                        job.percentage.as_deref().unwrap_or("0")
                    )
                })
                .await?;
        }
    }
    Ok(())
}

async fn run_files(api: Arc<BatchAppsApi>, action: FilesAction) -> Result<()> {
    let manager = FileManager::new(api);

    match action {
        FilesAction::List => {
            for file in manager.list_files().await? {
                println!("{:<40} {}", file.name(), file.last_modified());
            }
        }
        FilesAction::Find { names } => {
            let found = manager.find_files(&names).await?;
            if found.is_empty() {
                println!("No matching files");
            }
            for file in found {
                println!("{}", file);
            }
        }
        FilesAction::Upload {
            paths,
            dir,
            recursive,
            pattern,
            force,
            threads,
        } => {
            let mut collection =
                manager.create_file_set(paths.iter().map(|p| manager.create_file(p)));
            if let Some(dir) = dir {
                collection.extend(&manager.files_from_dir(&dir, recursive, &pattern)?);
            }
            let failed = collection.upload(force, threads).await?;
            for (file, reason) in &failed {
                eprintln!("Failed to upload {}: {}", file, reason);
            }
            println!(
                "Uploaded {} of {} files",
                collection.len() - failed.len(),
                collection.len()
            );
        }
    }
    Ok(())
}

async fn run_pools(api: Arc<BatchAppsApi>, action: PoolsAction) -> Result<()> {
    let mut manager = PoolManager::new(api);

    match action {
        PoolsAction::List => {
            for pool in manager.get_pools().await? {
                println!("{}", pool);
            }
        }
        PoolsAction::Show { id } => {
            let pool = manager.get_pool(&PoolRef::Id(id)).await?;
            println!("{}", pool);
            println!("Created:       {}", pool.created.as_deref().unwrap_or("-"));
            println!("Max tasks/TVM: {}", pool.max_tasks);
            println!("Communication: {}", pool.communication);
            println!("Active jobs:   {}", pool.jobs.len());
            if !pool.resize_error.is_empty() {
                println!("Resize error:  {}", pool.resize_error);
            }
        }
        PoolsAction::Create {
            target,
            max_tasks,
            communication,
        } => {
            let started = manager
                .create_pool(target, max_tasks, communication)
                .start()
                .await?;
            println!("Created pool {}", started.id);
        }
        PoolsAction::Resize { id, target } => {
            let mut pool = manager.get_pool(&PoolRef::Id(id)).await?;
            pool.resize(target).await?;
            println!("{}", pool);
        }
        PoolsAction::Delete { id } => {
            let pool = manager.get_pool(&PoolRef::Id(id)).await?;
            pool.delete().await?;
            println!("Deleted pool {}", pool);
        }
        PoolsAction::Clear => {
            let failed = manager.clear_pools().await?;
            for (pool, err) in &failed {
                eprintln!("Failed to delete {}: {}", pool, err);
            }
            println!("{} pools left", manager.count().unwrap_or(0));
        }
    }
    Ok(())
}
