use std::{path::Path, sync::Arc, time::Duration};

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use client_core::{
    hosted::DEFAULT_IMAGE_BUCKET, FormField, HostedBackend, HostedConfig, ImageUpload, ReviewForm,
    Session, SubmissionCoordinator, SubmissionOptions, WineResolver,
};
use shared::domain::WineId;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "wine-review", about = "Search wines and post reviews")]
struct Cli {
    #[arg(long, env = "BACKEND_URL")]
    backend_url: String,
    #[arg(long, env = "BACKEND_ANON_KEY", hide_env_values = true)]
    anon_key: String,
    /// Session token of the signed-in reviewer.
    #[arg(long, env = "WINE_REVIEW_TOKEN", hide_env_values = true)]
    access_token: Option<String>,
    #[arg(long, env = "IMAGE_BUCKET", default_value = DEFAULT_IMAGE_BUCKET)]
    bucket: String,
    #[arg(
        long,
        env = "REQUEST_TIMEOUT_SECS",
        default_value_t = 30,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    timeout_secs: u64,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Suggest wines whose name contains the query.
    Search { query: String },
    /// Show one wine.
    Wine { wine_id: i64 },
    /// Upload an image and store a review.
    Submit(SubmitArgs),
    /// Latest reviews, newest first.
    Reviews {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    SignOut,
}

#[derive(Args, Debug)]
struct SubmitArgs {
    /// Review an existing wine.
    #[arg(long, conflicts_with = "new_wine")]
    wine_id: Option<i64>,
    /// Register the wine described by --name/--year/--grape.
    #[arg(long, requires_all = ["name", "year", "grape"])]
    new_wine: bool,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    year: Option<String>,
    #[arg(long)]
    grape: Option<String>,
    #[arg(long)]
    rating: String,
    #[arg(long)]
    review: String,
    #[arg(long)]
    image: std::path::PathBuf,
    /// Delete the uploaded image if a later step fails.
    #[arg(long, env = "REMOVE_ORPHANED_IMAGES")]
    remove_orphaned_images: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();
    let cli = Cli::parse();

    let backend = HostedBackend::new(&HostedConfig {
        base_url: cli.backend_url.clone(),
        anon_key: cli.anon_key.clone(),
        image_bucket: cli.bucket.clone(),
        request_timeout: Duration::from_secs(cli.timeout_secs),
    })?;

    match cli.command {
        Command::Reviews { limit } => {
            let reviews = client_core::RecordStore::recent_reviews(&backend, limit).await?;
            println!("{}", serde_json::to_string_pretty(&reviews)?);
        }
        Command::Search { query } => {
            let session = sign_in(&backend, cli.access_token.as_deref()).await?;
            let resolver = WineResolver::new(Arc::new(backend.with_access_token(session.access_token())));
            let mut form = ReviewForm::new();
            form.search(&resolver, query).await?;
            for wine in form.suggestions() {
                println!("{}\t{}\t{}\t{}", wine.id, wine.name, wine.year, wine.grape);
            }
        }
        Command::Wine { wine_id } => {
            let session = sign_in(&backend, cli.access_token.as_deref()).await?;
            let resolver = WineResolver::new(Arc::new(backend.with_access_token(session.access_token())));
            let wine = resolver
                .lookup(WineId(wine_id))
                .await?
                .ok_or_else(|| anyhow!("wine {wine_id} not found"))?;
            println!("{}", serde_json::to_string_pretty(&wine)?);
        }
        Command::Submit(args) => {
            let session = sign_in(&backend, cli.access_token.as_deref()).await?;
            let scoped = Arc::new(backend.with_access_token(session.access_token()));
            let coordinator = SubmissionCoordinator::new(scoped.clone(), scoped).with_options(
                SubmissionOptions {
                    remove_orphaned_images: args.remove_orphaned_images,
                },
            );

            let mut form = ReviewForm::new();
            if let Some(wine_id) = args.wine_id {
                let wine = coordinator
                    .resolver()
                    .lookup(WineId(wine_id))
                    .await?
                    .ok_or_else(|| anyhow!("wine {wine_id} not found"))?;
                form.select_wine(wine);
            }
            let bytes = tokio::fs::read(&args.image)
                .await
                .with_context(|| format!("failed to read image '{}'", args.image.display()))?;
            fill_form(&mut form, &args, image_upload(&args.image, bytes))?;

            let submission = form.take_submission()?;
            let receipt = coordinator.submit(&session, submission).await?;
            info!(wine_id = %receipt.wine_id, key = %receipt.image_key, "cli: review submitted");
            println!("{}", serde_json::to_string_pretty(&receipt)?);
        }
        Command::SignOut => {
            let session = sign_in(&backend, cli.access_token.as_deref()).await?;
            session.sign_out(&backend).await?;
            println!("signed out");
        }
    }

    Ok(())
}

async fn sign_in(backend: &HostedBackend, access_token: Option<&str>) -> Result<Session> {
    let token = access_token.ok_or_else(|| anyhow!("--access-token or WINE_REVIEW_TOKEN is required"))?;
    Ok(Session::acquire(backend, token).await?)
}

fn fill_form(form: &mut ReviewForm, args: &SubmitArgs, image: ImageUpload) -> Result<()> {
    if args.new_wine {
        form.set_new_wine(true);
        let text = |value: &Option<String>| value.clone().unwrap_or_default();
        form.set_field(FormField::WineName, text(&args.name))?;
        form.set_field(FormField::Year, text(&args.year))?;
        form.set_field(FormField::Grape, text(&args.grape))?;
    }
    form.set_field(FormField::Rating, args.rating.as_str())?;
    form.set_field(FormField::Review, args.review.as_str())?;
    form.set_image(image);
    Ok(())
}

fn image_upload(path: &Path, bytes: Vec<u8>) -> ImageUpload {
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("image")
        .to_string();
    let content_type = mime_guess::from_path(path).first_raw().map(str::to_string);
    ImageUpload {
        filename,
        content_type,
        bytes,
    }
}
