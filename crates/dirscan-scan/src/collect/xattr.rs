//! Extended attributes via `getfattr`.

use std::ffi::OsStr;
use std::path::Path;

use dirscan_core::ExtendedAttributes;

use super::command::CommandRunner;

pub async fn collect_xattrs<R: CommandRunner>(
    runner: &R,
    path: &Path,
) -> Option<ExtendedAttributes> {
    let p = path.as_os_str();
    let dump_args = [OsStr::new("-d"), p];
    let selinux_args = [OsStr::new("-n"), OsStr::new("security.selinux"), p];
    let (all_attributes, selinux) = tokio::join!(
        runner.run("getfattr", &dump_args),
        runner.run("getfattr", &selinux_args),
    );
    let attrs = ExtendedAttributes {
        all_attributes,
        selinux,
    };
    (!attrs.is_empty()).then_some(attrs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::testing::ScriptedRunner;

    #[tokio::test]
    async fn test_partial_attributes() {
        let runner = ScriptedRunner::default().respond("getfattr -d", "user.tag=\"x\"");
        let attrs = collect_xattrs(&runner, Path::new("/f")).await.unwrap();
        assert_eq!(attrs.all_attributes.as_deref(), Some("user.tag=\"x\""));
        assert!(attrs.selinux.is_none());
    }

    #[tokio::test]
    async fn test_nothing_reported() {
        let runner = ScriptedRunner::default();
        assert!(collect_xattrs(&runner, Path::new("/f")).await.is_none());
    }
}
