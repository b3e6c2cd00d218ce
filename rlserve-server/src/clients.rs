// Client library generation and packaging

use anyhow::{Context, Result};
use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;
use tracing::{debug, info, warn};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::config::ClientsSection;

/// Substitute `{spec}`, `{lang}` and `{out}` into each template token
fn expand_template(template: &str, spec: &Path, lang: &str, out: &Path) -> Vec<String> {
    template
        .split_whitespace()
        .map(|token| {
            token
                .replace("{spec}", &spec.to_string_lossy())
                .replace("{lang}", lang)
                .replace("{out}", &out.to_string_lossy())
        })
        .collect()
}

/// Run the configured generator once per language.
///
/// Output for each language goes to `out_dir/<lang>`. A language whose
/// generator fails is logged and skipped; the rest still run. Returns how
/// many languages were generated.
pub async fn generate_clients(
    settings: &ClientsSection,
    spec_path: &Path,
    out_dir: &Path,
) -> Result<usize> {
    let Some(template) = settings.generator.as_deref() else {
        info!("no client generator configured, skipping client generation");
        return Ok(0);
    };

    tokio::fs::create_dir_all(out_dir)
        .await
        .with_context(|| format!("Failed to create clients directory {}", out_dir.display()))?;

    let mut generated = 0;
    for lang in &settings.languages {
        let lang_dir = out_dir.join(lang);
        let argv = expand_template(template, spec_path, lang, &lang_dir);
        let Some((program, args)) = argv.split_first() else {
            warn!("client generator template is empty");
            return Ok(generated);
        };

        debug!(program = %program, lang = %lang, "running client generator");
        match tokio::process::Command::new(program).args(args).output().await {
            Ok(output) if output.status.success() => {
                info!(lang = %lang, dir = %lang_dir.display(), "generated client library");
                generated += 1;
            }
            Ok(output) => warn!(
                lang = %lang,
                status = %output.status,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "client generator failed"
            ),
            Err(e) => warn!(lang = %lang, error = %e, "could not start client generator"),
        }
    }
    Ok(generated)
}

fn add_dir_entries(
    zip: &mut ZipWriter<Cursor<Vec<u8>>>,
    root: &Path,
    dir: &Path,
    options: FileOptions,
) -> Result<()> {
    let mut entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read {}", dir.display()))?
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        let relative = path
            .strip_prefix(root)?
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if entry.file_type()?.is_dir() {
            zip.add_directory(format!("{relative}/"), options)?;
            add_dir_entries(zip, root, &path, options)?;
        } else {
            zip.start_file(relative, options)?;
            zip.write_all(&fs::read(&path)?)?;
        }
    }
    Ok(())
}

/// Zip the clients directory into `archive` and return the archive bytes
pub fn package_clients(dir: &Path, archive: &Path) -> Result<Vec<u8>> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create clients directory {}", dir.display()))?;

    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    add_dir_entries(&mut zip, dir, dir, options)?;
    let bytes = zip.finish()?.into_inner();

    fs::write(archive, &bytes)
        .with_context(|| format!("Failed to write client archive {}", archive.display()))?;
    debug!(archive = %archive.display(), bytes = bytes.len(), "packaged client libraries");
    Ok(bytes)
}
