// src/commands/bucket.rs
//! Object store inspection commands

use anyhow::Result;
use taxi::PackageController;

/// List objects in a bucket, optionally under a prefix
pub fn cmd_bucket_ls(
    controller: &PackageController,
    bucket: Option<&str>,
    prefix: Option<&str>,
) -> Result<()> {
    let (bucket, objects) = controller.bucket_listing(bucket, prefix)?;

    if objects.is_empty() {
        println!("No objects in s3://{}/{}", bucket, prefix.unwrap_or(""));
        return Ok(());
    }

    for object in &objects {
        let modified = object
            .last_modified
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{:16}  {:>12}  {}", modified, object.size, object.key);
    }
    println!("\n{} objects in s3://{}", objects.len(), bucket);
    Ok(())
}
