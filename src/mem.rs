//! Process memory probe for the startup budget computation.

/// Resident set size of the current process in whole megabytes.
///
/// Linux only: the second field of `/proc/self/statm` is the RSS in pages.
/// Other platforms report 0, which degrades the budget check to validating
/// the configured limit alone.
pub fn current_rss_mb() -> u64 {
    #[cfg(target_os = "linux")]
    {
        let Ok(statm) = std::fs::read_to_string("/proc/self/statm") else {
            return 0;
        };
        let Some(rss_pages) = statm
            .split_whitespace()
            .nth(1)
            .and_then(|field| field.parse::<u64>().ok())
        else {
            return 0;
        };
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if page_size <= 0 {
            return 0;
        }
        rss_pages * page_size as u64 / (1024 * 1024)
    }
    #[cfg(not(target_os = "linux"))]
    {
        0
    }
}
