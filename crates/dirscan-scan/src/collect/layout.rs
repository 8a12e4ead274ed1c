//! Lustre layout probes built on `lfs`.

use std::ffi::OsStr;
use std::path::Path;

use dirscan_core::{LayoutComponent, LayoutMetadata, StripeInfo};

use super::command::CommandRunner;

const LFS: &str = "lfs";

/// Run every layout probe for `path`. Returns `None` when none produced output.
pub async fn collect_layout<R: CommandRunner>(runner: &R, path: &Path) -> Option<LayoutMetadata> {
    let p = path.as_os_str();
    let getstripe = OsStr::new("getstripe");

    let verbose_args = [getstripe, OsStr::new("-v"), p];
    let yaml_args = [getstripe, OsStr::new("-y"), p];
    let ost_args = [getstripe, OsStr::new("-O"), p];
    let fid_args = [OsStr::new("path2fid"), p];
    let count_args = [getstripe, OsStr::new("--component-count"), p];
    let df_args = [OsStr::new("df"), p];

    let (verbose, yaml, osts, fid, count, df, quota) = tokio::join!(
        runner.run(LFS, &verbose_args),
        runner.run(LFS, &yaml_args),
        runner.run(LFS, &ost_args),
        runner.run(LFS, &fid_args),
        runner.run(LFS, &count_args),
        runner.run(LFS, &df_args),
        user_quota(runner, p),
    );

    let mut layout = LayoutMetadata::default();

    if let Some(raw) = verbose {
        layout.stripe_parsed = StripeInfo::parse(&raw);
        layout.stripe_info_raw = Some(raw);
    }

    if let Some(text) = yaml {
        match serde_yaml::from_str::<serde_json::Value>(&text) {
            Ok(value) => layout.layout_yaml = Some(value),
            Err(err) => {
                tracing::debug!(path = %path.display(), "layout yaml did not parse: {err}");
                layout.layout_raw = Some(text);
            }
        }
    }

    if let Some(text) = osts {
        layout.set_ost_indices(&text);
    }
    layout.fid = fid;

    if let Some(count) = count.and_then(|c| c.trim().parse::<u32>().ok()) {
        layout.component_count = Some(count);
        let mut components = Vec::new();
        for id in component_ids(layout.layout_yaml.as_ref(), count) {
            let id_arg = id.to_string();
            let args = [getstripe, OsStr::new("--component-id"), OsStr::new(&id_arg), p];
            if let Some(info) = runner.run(LFS, &args).await {
                components.push(LayoutComponent {
                    component_id: id,
                    info,
                });
            }
        }
        layout.components = (!components.is_empty()).then_some(components);
    }

    layout.filesystem_info = df;
    layout.user_quota = quota;

    layout.into_option()
}

/// Component ids to query: the `lcme_id`s named by the YAML layout, or the
/// positions `0..count` when it names none.
fn component_ids(yaml: Option<&serde_json::Value>, count: u32) -> Vec<u32> {
    let listed: Vec<u32> = yaml
        .and_then(|v| v.get("components"))
        .and_then(|c| c.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|c| c.get("lcme_id")?.as_u64())
                .filter_map(|id| u32::try_from(id).ok())
                .collect()
        })
        .unwrap_or_default();
    if listed.is_empty() {
        (0..count).collect()
    } else {
        listed
    }
}

/// The `lfs` version string, recorded in the session.
pub async fn lustre_version<R: CommandRunner>(runner: &R) -> Option<String> {
    runner.run(LFS, &[OsStr::new("--version")]).await
}

async fn user_quota<R: CommandRunner>(runner: &R, path: &OsStr) -> Option<String> {
    let uid = effective_uid().to_string();
    let args = [OsStr::new("quota"), OsStr::new("-u"), OsStr::new(&uid), path];
    let text = runner.run(LFS, &args).await?;
    (!text.to_lowercase().contains("not supported")).then_some(text)
}

#[cfg(unix)]
fn effective_uid() -> u32 {
    unsafe { libc::geteuid() }
}

#[cfg(not(unix))]
fn effective_uid() -> u32 {
    0
}
