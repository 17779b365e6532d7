use log::warn;

/// Command that reports per-filesystem usage on the cluster
pub const QUOTA_COMMAND: &str = "myquota";

/// Usage percentage of `/scratch` from `myquota` output
///
/// The first `/scratch` line with at least four columns and a `( NN%)` group wins. Returns `None`
/// if no such line exists.
pub fn parse_scratch_usage(output: &str) -> Option<u32> {
    for line in output.lines().filter(|line| line.contains("/scratch")) {
        if line.split_whitespace().count() < 4 {
            continue;
        }
        match percentage_group(line) {
            Some(used) => return Some(used),
            None => warn!("Unexpected line: {line}"),
        }
    }
    None
}

/// First `(<spaces><digits>%)` group in a line
fn percentage_group(line: &str) -> Option<u32> {
    line.match_indices('(').find_map(|(start, _)| {
        let rest = &line[start + 1..];
        let inner = &rest[..rest.find(')')?];
        let digits = inner.strip_suffix('%')?.trim_start();
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MYQUOTA: &str = "\
Filesystem   Environment   Backed up?   Allocation        Current Usage
Space        Variable      /Flushed?    Space / Files     Space(%) / Files(%)

/home        $HOME         Yes/No       50.0GB/0.03M      4.12GB(8%)/1292(4%)
/scratch     $SCRATCH      NO/YES       5.0TB/1.0M        4.95TB( 99%)/201033(20%)
";

    #[test]
    fn reads_scratch_percentage() {
        assert_eq!(parse_scratch_usage(MYQUOTA), Some(99));
    }

    #[test]
    fn full_scratch() {
        let full = MYQUOTA.replace("( 99%)", "(100%)");
        assert_eq!(parse_scratch_usage(&full), Some(100));
    }

    #[test]
    fn missing_scratch_line_is_unknown() {
        assert_eq!(parse_scratch_usage("/home $HOME Yes/No 50.0GB/0.03M 4.12GB(8%)/1292(4%)"), None);
        assert_eq!(parse_scratch_usage(""), None);
    }

    #[test]
    fn malformed_scratch_line_is_skipped() {
        let output = "/scratch $SCRATCH NO/YES 5.0TB/1.0M 4.95TB/201033\n/scratch $SCRATCH x y (42%)";
        assert_eq!(parse_scratch_usage(output), Some(42));
        assert_eq!(parse_scratch_usage("/scratch (42%)"), None);
    }
}
