// src/commands/package.rs
//! Package lifecycle commands

use anyhow::Result;
use taxi::{Agency, PackageController};
use tracing::info;

/// Create a dated package archive from a bucket path
pub fn cmd_package_make(
    controller: &PackageController,
    name: &str,
    path: &str,
    bucket: Option<&str>,
) -> Result<()> {
    info!("package make: name={} path={} bucket={:?}", name, path, bucket);
    let archive = controller.make(name, path, bucket)?;
    println!("Package created: {}", archive.display());
    Ok(())
}

/// Submit the latest cached package to an agency
pub fn cmd_package_translate(
    controller: &mut PackageController,
    name: &str,
    from: &str,
    to: &str,
    agency: Option<String>,
) -> Result<()> {
    let agency = Agency::from(agency);
    info!("package translate: name={} {} -> {} ({})", name, from, to, agency);
    let remote = controller.translate(name, from, to, &agency)?;
    println!("Submitted {} to {}", remote, agency);
    Ok(())
}

/// Deploy translated packages and archive them
pub fn cmd_package_deploy(
    controller: &mut PackageController,
    name: &str,
    path: &str,
    from: &str,
    to: &str,
    agency: Option<String>,
    bucket: Option<&str>,
) -> Result<()> {
    let agency = Agency::from(agency);
    info!("package deploy: name={} path={} to={} ({})", name, path, to, agency);
    let report = controller.deploy(name, path, from, to, &agency, bucket)?;

    println!("Deployed to s3://{}/{}:", report.bucket, report.target);
    for package in &report.packages {
        println!(
            "  {} ({} files, {} replaced)",
            package.name, package.uploaded, package.replaced
        );
    }
    println!("{} packages archived", report.packages.len());
    Ok(())
}
