/// Hostname of the running system, or an empty string if it cannot be read
#[cfg(unix)]
pub fn current_hostname() -> String {
    let mut buf = [0u8; 256];
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if rc != 0 {
        log::warn!("gethostname failed: {}", std::io::Error::last_os_error());
        return String::new();
    }

    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..len]).into_owned()
}

#[cfg(not(unix))]
pub fn current_hostname() -> String {
    std::env::var("COMPUTERNAME").unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_hostname_has_no_nul() {
        let hostname = current_hostname();
        assert!(!hostname.contains('\0'));
    }
}
