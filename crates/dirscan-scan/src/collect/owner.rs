//! User and group name lookup.

use std::collections::HashMap;
use std::sync::Mutex;

/// Resolves numeric ids to names, remembering every answer.
///
/// Misses are cached too; the caller falls back to the numeric id.
#[derive(Debug, Default)]
pub struct OwnerResolver {
    users: Mutex<HashMap<u32, Option<String>>>,
    groups: Mutex<HashMap<u32, Option<String>>>,
}

impl OwnerResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name of the user with `uid`, if the local database knows it.
    pub fn user_name(&self, uid: u32) -> Option<String> {
        cached(&self.users, uid, lookup_user)
    }

    /// Name of the group with `gid`, if the local database knows it.
    pub fn group_name(&self, gid: u32) -> Option<String> {
        cached(&self.groups, gid, lookup_group)
    }
}

fn cached(
    cache: &Mutex<HashMap<u32, Option<String>>>,
    id: u32,
    lookup: fn(u32) -> Option<String>,
) -> Option<String> {
    if let Ok(map) = cache.lock() {
        if let Some(hit) = map.get(&id) {
            return hit.clone();
        }
    }
    let name = lookup(id);
    if let Ok(mut map) = cache.lock() {
        map.insert(id, name.clone());
    }
    name
}

#[cfg(unix)]
fn lookup_user(uid: u32) -> Option<String> {
    use std::ffi::CStr;
    use std::{mem, ptr};

    let mut buf = vec![0; 2048];
    let mut passwd = unsafe { mem::zeroed::<libc::passwd>() };
    let mut result = ptr::null_mut::<libc::passwd>();

    loop {
        let r = unsafe {
            libc::getpwuid_r(uid, &mut passwd, buf.as_mut_ptr(), buf.len(), &mut result)
        };
        if r != libc::ERANGE {
            break;
        }
        let newsize = buf.len().checked_mul(2)?;
        buf.resize(newsize, 0);
    }

    if result.is_null() || passwd.pw_name.is_null() {
        return None;
    }
    let name = unsafe { CStr::from_ptr(passwd.pw_name) };
    Some(name.to_string_lossy().into_owned())
}

#[cfg(unix)]
fn lookup_group(gid: u32) -> Option<String> {
    use std::ffi::CStr;
    use std::{mem, ptr};

    let mut buf = vec![0; 2048];
    let mut group = unsafe { mem::zeroed::<libc::group>() };
    let mut result = ptr::null_mut::<libc::group>();

    loop {
        let r = unsafe {
            libc::getgrgid_r(gid, &mut group, buf.as_mut_ptr(), buf.len(), &mut result)
        };
        if r != libc::ERANGE {
            break;
        }
        let newsize = buf.len().checked_mul(2)?;
        buf.resize(newsize, 0);
    }

    if result.is_null() || group.gr_name.is_null() {
        return None;
    }
    let name = unsafe { CStr::from_ptr(group.gr_name) };
    Some(name.to_string_lossy().into_owned())
}

#[cfg(not(unix))]
fn lookup_user(_uid: u32) -> Option<String> {
    None
}

#[cfg(not(unix))]
fn lookup_group(_gid: u32) -> Option<String> {
    None
}
