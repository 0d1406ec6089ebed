use regex::Regex;
use std::sync::LazyLock;

use super::{Builder, WarningReason, split_header};

// " 3 files changed, 10 insertions(+), 2 deletions(-)"; either count may be absent.
static SUMMARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(\d+) files? changed(?:, (\d+) insertions?\(\+\))?(?:, (\d+) deletions?\(-\))?\s*$",
    )
    .expect("valid summary pattern")
});

pub(super) fn feed(builder: &mut Builder<'_>, number: usize, line: &str) {
    if let Some(header) = split_header(line) {
        builder.open(number, header, None);
        return;
    }

    if line.contains('|') {
        builder.close();
        builder.warn(number, WarningReason::MalformedHeader);
        return;
    }

    let Some(caps) = SUMMARY.captures(line) else {
        builder.warn(number, WarningReason::UnrecognizedLine);
        return;
    };

    if !builder.is_open() {
        builder.warn(number, WarningReason::OrphanLine);
        return;
    }

    let count = |idx: usize| -> Option<u64> {
        caps.get(idx)
            .map_or(Some(0), |m| m.as_str().parse::<u64>().ok())
    };

    match (count(2), count(3)) {
        (Some(added), Some(removed)) => builder.add_lines(added, removed),
        _ => builder.warn(number, WarningReason::BadCount),
    }
}

#[cfg(test)]
mod tests {
    use crate::git::LogFormat;
    use crate::parse::tests::options;
    use crate::parse::{WarningReason, parse_log};

    const LOG: &str = "\
1111111aaaa|Ada Lovelace|1700000300|Add parser

 2 files changed, 120 insertions(+), 4 deletions(-)
2222222bbbb|Grace Hopper|1700000200|Remove dead code

 1 file changed, 30 deletions(-)
3333333cccc|Ada Lovelace|1700000100|Empty commit
4444444dddd|Linus|1700000000|Initial import

 5 files changed, 1 insertion(+)
";

    #[test]
    fn parses_headers_and_summaries_in_source_order() {
        let parsed = parse_log(LOG.as_bytes(), LogFormat::Shortstat, &options()).unwrap();

        let hashes: Vec<_> = parsed.commits.iter().map(|c| c.hash.as_str()).collect();
        assert_eq!(hashes, vec!["1111111", "2222222", "3333333", "4444444"]);

        let first = &parsed.commits[0];
        assert_eq!(first.author, "Ada Lovelace");
        assert_eq!(first.timestamp, 1_700_000_300);
        assert_eq!((first.lines_added, first.lines_removed), (120, 4));
        assert_eq!(first.message, "Add parser");
        assert_eq!(first.files_touched, None);

        assert_eq!(
            (parsed.commits[1].lines_added, parsed.commits[1].lines_removed),
            (0, 30)
        );
        assert_eq!(
            (parsed.commits[2].lines_added, parsed.commits[2].lines_removed),
            (0, 0)
        );
        assert_eq!(parsed.commits[3].lines_added, 1);
        assert!(parsed.warnings.is_empty());
        assert!(parsed.touches.is_empty());
    }

    #[test]
    fn bad_timestamp_falls_back_without_aborting() {
        let log = "abc1234|Ada|not-a-number|Subject\n 1 file changed, 2 insertions(+)\n";
        let parsed = parse_log(log.as_bytes(), LogFormat::Shortstat, &options()).unwrap();

        assert_eq!(parsed.commits.len(), 1);
        assert_eq!(parsed.commits[0].timestamp, 42);
        assert_eq!(parsed.commits[0].lines_added, 2);
        assert_eq!(parsed.warnings[0].reason, WarningReason::BadTimestamp);
    }

    #[test]
    fn junk_lines_are_skipped() {
        let log = "\
 3 files changed, 9 insertions(+)
abc1234|Ada|100|First
garbage that is not a summary
only|three|fields
def5678|Bob|200|Second
 1 file changed, 1 deletion(-)
";
        let parsed = parse_log(log.as_bytes(), LogFormat::Shortstat, &options()).unwrap();

        assert_eq!(parsed.commits.len(), 2);
        assert_eq!(parsed.commits[0].lines_added, 0);
        assert_eq!(parsed.commits[1].lines_removed, 1);

        let reasons: Vec<_> = parsed.warnings.iter().map(|w| (w.line, w.reason)).collect();
        assert_eq!(
            reasons,
            vec![
                (1, WarningReason::OrphanLine),
                (3, WarningReason::UnrecognizedLine),
                (4, WarningReason::MalformedHeader),
            ]
        );
    }

    #[test]
    fn trailing_record_is_emitted() {
        let log = "abc1234|Ada|100|Only commit\n\n 1 file changed, 7 insertions(+)";
        let parsed = parse_log(log.as_bytes(), LogFormat::Shortstat, &options()).unwrap();
        assert_eq!(parsed.commits.len(), 1);
        assert_eq!(parsed.commits[0].lines_added, 7);
    }

    #[test]
    fn crlf_line_endings_are_tolerated() {
        let log = "abc1234|Ada|100|Subject\r\n 1 file changed, 3 insertions(+), 1 deletion(-)\r\n";
        let parsed = parse_log(log.as_bytes(), LogFormat::Shortstat, &options()).unwrap();
        assert_eq!(parsed.commits[0].message, "Subject");
        assert_eq!(
            (parsed.commits[0].lines_added, parsed.commits[0].lines_removed),
            (3, 1)
        );
    }
}
