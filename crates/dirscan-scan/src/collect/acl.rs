//! POSIX ACLs via `getfacl`.

use std::path::Path;

use dirscan_core::AclInfo;

use super::command::CommandRunner;

pub async fn collect_acl<R: CommandRunner>(runner: &R, path: &Path) -> Option<AclInfo> {
    let text = runner.run("getfacl", &[path.as_os_str()]).await?;
    if text.contains("Operation not supported") {
        return None;
    }
    Some(AclInfo {
        posix_acl: Some(text),
    })
}
