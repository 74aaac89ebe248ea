//! Command definitions and dispatch.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use deltaglider_common::{ConfigError, DeltaGliderConfig};
use deltaglider_core::{
    join_key, BucketAnalysis, BucketStats, DeltaEngine, DeltaError, ListObjectsV2Output,
    ListOptions, S3Url, StoreError,
};
use deltaglider_s3::S3ObjectStore;

/// Delta-aware S3 file storage: references, deltas, ordinary object semantics.
#[derive(Parser)]
#[command(name = "dg")]
#[command(about = "Delta-aware S3 object storage", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable debug logging.
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Upload local files to a destination prefix.
    Put {
        /// Local files to upload.
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Destination, e.g. s3://bucket/releases/v1.0/
        dest: String,
        /// Max delta/original ratio before storing direct.
        #[arg(long, env = "DG_MAX_RATIO")]
        max_ratio: Option<f64>,
    },
    /// Download an object, reconstructing deltas transparently.
    Get {
        /// Object URL, e.g. s3://bucket/releases/v1.0/app.zip
        url: String,
        /// Output path (defaults to the object's filename).
        output: Option<PathBuf>,
    },
    /// List the logical namespace under a prefix.
    Ls {
        /// Bucket or prefix URL, e.g. s3://bucket/releases/
        url: String,
        /// Show sizes and delta markers.
        #[arg(short, long)]
        long: bool,
        /// Expose reference objects (administrative).
        #[arg(long)]
        include_references: bool,
    },
    /// Delete logical objects.
    Rm {
        /// Object URLs.
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Aggregate logical-vs-physical storage statistics.
    Stats {
        /// Bucket name.
        bucket: String,
        /// Restrict to a prefix.
        #[arg(long, default_value = "")]
        prefix: String,
        /// Emit JSON.
        #[arg(long)]
        json: bool,
    },
    /// Estimate potential savings without changing anything.
    Analyze {
        /// Bucket or prefix URL.
        url: String,
    },
    /// Copy between local paths and/or S3 URLs.
    Cp {
        /// Source (local path or s3:// URL).
        src: String,
        /// Destination (local path or s3:// URL).
        dst: String,
    },
    /// Delete expired rehydrated objects under .deltaglider/tmp/.
    PurgeTmp {
        /// Bucket name.
        bucket: String,
    },
}

impl Cli {
    /// Dispatch the parsed command.
    pub async fn run(self) -> Result<()> {
        let mut config: DeltaGliderConfig = DeltaGliderConfig::from_env()?;
        if let Command::Put {
            max_ratio: Some(ratio),
            ..
        } = self.command
        {
            config = config.with_max_ratio(ratio);
        }

        let store: S3ObjectStore = S3ObjectStore::from_env(&config).await;
        let engine: DeltaEngine<S3ObjectStore> = DeltaEngine::new(store, config);

        match self.command {
            Command::Put { files, dest, .. } => put(&engine, &files, &dest).await,
            Command::Get { url, output } => get(&engine, &url, output).await,
            Command::Ls {
                url,
                long,
                include_references,
            } => ls(&engine, &url, long, include_references).await,
            Command::Rm { urls } => rm(&engine, &urls).await,
            Command::Stats {
                bucket,
                prefix,
                json,
            } => stats(&engine, &bucket, &prefix, json).await,
            Command::Analyze { url } => analyze(&engine, &url).await,
            Command::Cp { src, dst } => cp(&engine, &src, &dst).await,
            Command::PurgeTmp { bucket } => purge_tmp(&engine, &bucket).await,
        }
    }
}

/// Map an error chain onto the documented exit codes.
///
/// 2 usage, 3 auth/config, 4 not-found, 5 integrity, 6 store, 1 otherwise.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    if let Some(delta_err) = err.downcast_ref::<DeltaError>() {
        return match delta_err {
            DeltaError::Config { .. } => 3,
            DeltaError::ObjectNotFound { .. } => 4,
            DeltaError::IntegrityFailure { .. }
            | DeltaError::ReferenceCorrupt { .. }
            | DeltaError::StorageInconsistency { .. } => 5,
            // Non-404 4xx surfaces like a missing object.
            DeltaError::Store(StoreError::Permanent { .. }) => 4,
            DeltaError::Store(_) => 6,
            _ => 1,
        };
    }
    if err.downcast_ref::<ConfigError>().is_some() {
        return 3;
    }
    1
}

async fn put(engine: &DeltaEngine<S3ObjectStore>, files: &[PathBuf], dest: &str) -> Result<()> {
    let url: S3Url = S3Url::parse(dest)?;

    for file in files {
        let body: Vec<u8> = tokio::fs::read(file)
            .await
            .with_context(|| format!("reading {}", file.display()))?;
        let filename: &str = file
            .file_name()
            .and_then(|name| name.to_str())
            .with_context(|| format!("invalid filename: {}", file.display()))?;
        let key: String = join_key(url.key.trim_end_matches('/'), filename);

        let (_, summary) = engine.put_object(&url.bucket, &key, &body).await?;
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }
    Ok(())
}

async fn get(
    engine: &DeltaEngine<S3ObjectStore>,
    url: &str,
    output: Option<PathBuf>,
) -> Result<()> {
    let url: S3Url = S3Url::parse(url)?;
    if url.key.is_empty() {
        bail!(DeltaError::Config {
            message: "get requires an object key".to_string(),
        });
    }

    let object = engine.get_object(&url.bucket, &url.key).await?;

    let output: PathBuf = output.unwrap_or_else(|| {
        let (_, filename): (&str, &str) = deltaglider_core::split_key(&url.key);
        PathBuf::from(filename)
    });
    tokio::fs::write(&output, &object.body)
        .await
        .with_context(|| format!("writing {}", output.display()))?;

    eprintln!(
        "Downloaded s3://{}/{} -> {} ({} bytes)",
        url.bucket,
        url.key,
        output.display(),
        object.content_length
    );
    Ok(())
}

async fn ls(
    engine: &DeltaEngine<S3ObjectStore>,
    url: &str,
    long: bool,
    include_references: bool,
) -> Result<()> {
    let url: S3Url = S3Url::parse(url)?;
    let mut start_after: Option<String> = None;

    loop {
        let listing: ListObjectsV2Output = engine
            .list_objects(
                &url.bucket,
                &url.key,
                ListOptions {
                    include_references,
                    start_after: start_after.clone(),
                    ..Default::default()
                },
            )
            .await?;

        for entry in &listing.contents {
            if long {
                let marker: &str = match entry
                    .metadata
                    .get("deltaglider-is-delta")
                    .map(String::as_str)
                {
                    Some("true") => "D",
                    _ => " ",
                };
                println!("{:>12}  {}  {}", entry.size, marker, entry.key);
            } else {
                println!("{}", entry.key);
            }
        }

        if !listing.is_truncated {
            break;
        }
        start_after = listing.next_continuation_token;
        if start_after.is_none() {
            break;
        }
    }
    Ok(())
}

async fn rm(engine: &DeltaEngine<S3ObjectStore>, urls: &[String]) -> Result<()> {
    for raw in urls {
        let url: S3Url = S3Url::parse(raw)?;
        engine.delete_object(&url.bucket, &url.key).await?;
        eprintln!("Deleted {url}");
    }
    Ok(())
}

async fn stats(
    engine: &DeltaEngine<S3ObjectStore>,
    bucket: &str,
    prefix: &str,
    json: bool,
) -> Result<()> {
    let stats: BucketStats = engine.stats(bucket, prefix).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("Objects:        {}", stats.object_count);
        println!("Deltas:         {}", stats.delta_count);
        println!("Logical bytes:  {}", stats.logical_bytes);
        println!("Physical bytes: {}", stats.physical_bytes);
        println!("Savings:        {:.1}%", stats.savings_ratio * 100.0);
    }
    Ok(())
}

async fn analyze(engine: &DeltaEngine<S3ObjectStore>, url: &str) -> Result<()> {
    let url: S3Url = S3Url::parse(url)?;
    let analysis: BucketAnalysis =
        deltaglider_core::analyze_bucket(engine.store(), &url.bucket, &url.key).await?;

    println!("Original bytes:  {}", analysis.original_bytes);
    println!("Projected bytes: {}", analysis.projected_bytes);
    println!("Projected ratio: {:.3}", analysis.projected_ratio);
    for group in &analysis.groups {
        println!(
            "  {:<40} {:>4} files  {:>12} -> {:>12}",
            group.group_id, group.file_count, group.original_bytes, group.projected_bytes
        );
    }
    Ok(())
}

async fn cp(engine: &DeltaEngine<S3ObjectStore>, src: &str, dst: &str) -> Result<()> {
    let src_is_s3: bool = src.starts_with("s3://");
    let dst_is_s3: bool = dst.starts_with("s3://");

    match (src_is_s3, dst_is_s3) {
        (true, true) => {
            let src: S3Url = S3Url::parse(src)?;
            let dst: S3Url = S3Url::parse(dst)?;
            engine
                .copy_object(&src.bucket, &src.key, &dst.bucket, &dst.key)
                .await?;
            eprintln!("Copied {src} -> {dst}");
            Ok(())
        }
        (false, true) => put(engine, &[PathBuf::from(src)], dst).await,
        (true, false) => {
            let dst_path: &Path = Path::new(dst);
            let output: Option<PathBuf> = if dst_path.is_dir() {
                let src_url: S3Url = S3Url::parse(src)?;
                let (_, filename): (&str, &str) = deltaglider_core::split_key(&src_url.key);
                Some(dst_path.join(filename))
            } else {
                Some(dst_path.to_path_buf())
            };
            get(engine, src, output).await
        }
        (false, false) => bail!(DeltaError::Config {
            message: "cp requires at least one s3:// side".to_string(),
        }),
    }
}

async fn purge_tmp(engine: &DeltaEngine<S3ObjectStore>, bucket: &str) -> Result<()> {
    let deleted: u64 = engine.purge_tmp(bucket).await?;
    eprintln!("Purged {deleted} expired object(s)");
    Ok(())
}
