//! Parameter substitution for `%x` tokens
//!
//! Configuration text may embed host and environment facts:
//!
//! | token           | replacement                                        |
//! |-----------------|----------------------------------------------------|
//! | `%d`            | unique temp directory, created once per process    |
//! | `%D`            | current time as `yyyyMMddHHmmssSSS`                |
//! | `%h`            | local host name                                    |
//! | `%c`            | local canonical host name                          |
//! | `%i`            | local IP address                                   |
//! | `%H`            | home directory                                     |
//! | `%n`            | user name                                          |
//! | `%o` `%a` `%v`  | OS name, architecture, version                     |
//! | `%t`            | temp directory                                     |
//! | `%(name)`       | property `name`, left as `%(name)` when absent     |
//! | `%(name:dflt)`  | property `name`, `dflt` when absent                |
//!
//! Anything else after `%` is copied through untouched. Substitution is a
//! single pass: a replacement that itself contains `%` is not expanded again.

use std::env;
use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs};
use std::path::PathBuf;

use chrono::Local;
use log::{debug, warn};
use once_cell::sync::OnceCell;

static UNIQUE_TEMP_DIRECTORY: OnceCell<String> = OnceCell::new();

/// Expand every `%` token in `source`
pub fn substitute(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars();

    while let Some(ch) = chars.next() {
        if ch != '%' {
            out.push(ch);
            continue;
        }

        let Some(token) = chars.next() else {
            out.push('%');
            break;
        };

        match token {
            'd' => out.push_str(unique_temp_directory()),
            'D' => out.push_str(&datestamp()),
            'h' => out.push_str(&host_name()),
            'c' => out.push_str(&canonical_host_name()),
            'i' => out.push_str(&ip_address()),
            'H' => out.push_str(&property("user.home").unwrap_or_default()),
            'n' => out.push_str(&property("user.name").unwrap_or_default()),
            'o' => out.push_str(&property("os.name").unwrap_or_default()),
            'a' => out.push_str(&property("os.arch").unwrap_or_default()),
            'v' => out.push_str(&property("os.version").unwrap_or_default()),
            't' => out.push_str(&property("java.io.tmpdir").unwrap_or_default()),
            '(' => {
                let mut name = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == ')' {
                        closed = true;
                        break;
                    }
                    name.push(c);
                }

                if closed {
                    out.push_str(&expand_property(&name));
                } else {
                    out.push_str("%(");
                    out.push_str(&name);
                }
            }
            other => {
                out.push('%');
                out.push(other);
            }
        }
    }

    out
}

/// `name` or `name:default` from inside `%(...)`
fn expand_property(body: &str) -> String {
    match body.rfind(':') {
        Some(index) if index > 0 => {
            let (name, fallback) = (&body[..index], &body[index + 1..]);
            property(name).unwrap_or_else(|| fallback.to_string())
        }
        _ => property(body).unwrap_or_else(|| format!("%({})", body)),
    }
}

/// Look up a named property
///
/// Environment variables win; otherwise the conventional JVM-style property
/// names (`user.dir`, `user.home`, `os.name`, ...) are answered from the
/// running process.
pub fn property(name: &str) -> Option<String> {
    if let Ok(value) = env::var(name) {
        return Some(value);
    }

    match name {
        "user.dir" => env::current_dir().ok().map(path_string),
        "user.home" => dirs::home_dir().map(path_string),
        "user.name" => env::var("USER").or_else(|_| env::var("USERNAME")).ok(),
        "os.name" => Some(env::consts::OS.to_string()),
        "os.arch" => Some(env::consts::ARCH.to_string()),
        "os.version" => os_version(),
        "java.io.tmpdir" => Some(path_string(env::temp_dir())),
        "file.separator" => Some(std::path::MAIN_SEPARATOR.to_string()),
        _ => None,
    }
}

fn path_string(path: PathBuf) -> String {
    path.to_string_lossy().into_owned()
}

fn os_version() -> Option<String> {
    std::fs::read_to_string("/proc/sys/kernel/osrelease")
        .ok()
        .map(|v| v.trim().to_string())
}

/// Process-unique temp directory, created on first use
///
/// Falls back to the system temp directory when a fresh one cannot be made.
pub fn unique_temp_directory() -> &'static str {
    UNIQUE_TEMP_DIRECTORY.get_or_init(|| {
        match tempfile::Builder::new().prefix("terracotta").suffix("data").tempdir() {
            Ok(dir) => {
                let path = dir.keep();
                debug!("Created unique temp directory {}", path.display());
                path_string(path)
            }
            Err(e) => {
                warn!("Cannot create unique temp directory, using system temp: {}", e);
                path_string(env::temp_dir())
            }
        }
    })
}

fn datestamp() -> String {
    Local::now().format("%Y%m%d%H%M%S%3f").to_string()
}

/// Local host name
pub fn host_name() -> String {
    match hostname::get() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(e) => {
            warn!("Cannot determine local host name: {}", e);
            "localhost".to_string()
        }
    }
}

/// Local canonical host name
///
/// Without reverse resolution this is the host name as the system reports it,
/// which is already fully qualified on hosts configured that way.
pub fn canonical_host_name() -> String {
    host_name()
}

/// Local IP address
///
/// Resolves the host name, preferring IPv4, and falls back to loopback.
pub fn ip_address() -> String {
    let host = host_name();
    let resolved: Vec<IpAddr> = match (host.as_str(), 0).to_socket_addrs() {
        Ok(addrs) => addrs.map(|a| a.ip()).collect(),
        Err(e) => {
            warn!("Cannot resolve local host name {}: {}", host, e);
            Vec::new()
        }
    };

    resolved
        .iter()
        .find(|ip| ip.is_ipv4())
        .or_else(|| resolved.first())
        .copied()
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_plain_text_unchanged() {
        assert_eq!(substitute("no tokens here"), "no tokens here");
        assert_eq!(substitute(""), "");
        let once = substitute("logs/server-1");
        assert_eq!(substitute(&once), once);
    }

    #[test]
    fn test_unknown_token_passes_through() {
        assert_eq!(substitute("100%x"), "100%x");
        assert_eq!(substitute("%%"), "%%");
        assert_eq!(substitute("trailing%"), "trailing%");
    }

    #[test]
    fn test_unclosed_property_passes_through() {
        assert_eq!(substitute("a%(user.dir"), "a%(user.dir");
    }

    #[test]
    #[serial]
    fn test_property_with_fallback() {
        env::remove_var("tc.test.missing");
        assert_eq!(substitute("%(tc.test.missing:/tmp)"), "/tmp");
        assert_eq!(substitute("%(tc.test.missing)"), "%(tc.test.missing)");

        env::set_var("tc.test.present", "value");
        assert_eq!(substitute("x-%(tc.test.present:/tmp)-y"), "x-value-y");
        env::remove_var("tc.test.present");
    }

    #[test]
    fn test_user_dir_property() {
        let cwd = env::current_dir().unwrap().to_string_lossy().into_owned();
        let expected = env::var("user.dir").unwrap_or(cwd);
        assert_eq!(substitute("%(user.dir:/tmp)"), expected);
    }

    #[test]
    fn test_host_tokens() {
        assert_eq!(substitute("%h"), host_name());
        assert_eq!(substitute("%i"), ip_address());
        assert!(ip_address().parse::<IpAddr>().is_ok());
    }

    #[test]
    fn test_datestamp_shape() {
        let stamp = substitute("%D");
        assert_eq!(stamp.len(), 17);
        assert!(stamp.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_unique_temp_directory_is_memoized() {
        let first = substitute("%d");
        let second = substitute("%d");
        assert_eq!(first, second);

        let from_threads: Vec<String> = (0..4)
            .map(|_| std::thread::spawn(|| unique_temp_directory().to_string()))
            .map(|h| h.join().unwrap())
            .collect();
        assert!(from_threads.iter().all(|d| *d == first));
    }

    #[test]
    fn test_os_tokens() {
        assert_eq!(substitute("%o/%a"), format!("{}/{}", env::consts::OS, env::consts::ARCH));
        assert_eq!(substitute("%t"), env::temp_dir().to_string_lossy());
    }
}
