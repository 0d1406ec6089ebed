use crate::git::NUMSTAT_SENTINEL;

use super::{Builder, WarningReason, split_header};

// git prints "-" for both counts of a binary file.
const BINARY_PLACEHOLDER: &str = "-";

pub(super) fn feed(builder: &mut Builder<'_>, number: usize, line: &str) {
    if let Some(rest) = line.strip_prefix(NUMSTAT_SENTINEL) {
        match split_header(rest) {
            Some(header) => builder.open(number, header, Some(0)),
            None => {
                builder.close();
                builder.warn(number, WarningReason::MalformedHeader);
            }
        }
        return;
    }

    let mut fields = line.splitn(3, '\t');
    let (Some(added), Some(removed), Some(path)) = (fields.next(), fields.next(), fields.next())
    else {
        builder.warn(number, WarningReason::UnrecognizedLine);
        return;
    };

    if !builder.is_open() {
        builder.warn(number, WarningReason::OrphanLine);
        return;
    }

    match (parse_count(added), parse_count(removed)) {
        (Some(added), Some(removed)) => builder.add_file(path, added, removed),
        _ => builder.warn(number, WarningReason::BadCount),
    }
}

fn parse_count(field: &str) -> Option<u64> {
    let field = field.trim();
    if field == BINARY_PLACEHOLDER {
        return Some(0);
    }
    field.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::parse_count;
    use crate::git::LogFormat;
    use crate::parse::tests::options;
    use crate::parse::{WarningReason, parse_log};

    #[test]
    fn binary_file_counts_as_zero_lines() {
        let log = "__COMMIT__9f8e7d6c5b|Ada|1700000000|Add logo\n\n-\t-\tassets/img.png\n";
        let parsed = parse_log(log.as_bytes(), LogFormat::Numstat, &options()).unwrap();

        assert_eq!(parsed.commits.len(), 1);
        let commit = &parsed.commits[0];
        assert_eq!(commit.hash, "9f8e7d6");
        assert_eq!((commit.lines_added, commit.lines_removed), (0, 0));
        assert_eq!(commit.files_touched, Some(1));
        assert_eq!(parsed.touches.get("assets/img.png"), Some(1));
        assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn sums_per_file_lines_and_tallies_paths() {
        let log = "\
__COMMIT__aaaaaaa111|Ada|200|Second

10\t2\tsrc/lib.rs
3\t0\tREADME.md
__COMMIT__bbbbbbb222|Bob|100|First

5\t5\tsrc/lib.rs
1\t0\tsrc/lib.rs
__COMMIT__ccccccc333|Bob|50|Empty
";
        let parsed = parse_log(log.as_bytes(), LogFormat::Numstat, &options()).unwrap();

        assert_eq!(parsed.commits.len(), 3);
        assert_eq!(
            (parsed.commits[0].lines_added, parsed.commits[0].lines_removed),
            (13, 2)
        );
        assert_eq!(parsed.commits[0].files_touched, Some(2));

        // The same path twice in one commit is counted twice.
        assert_eq!(parsed.commits[1].files_touched, Some(2));
        assert_eq!(parsed.touches.get("src/lib.rs"), Some(3));
        assert_eq!(parsed.touches.get("README.md"), Some(1));

        assert_eq!(parsed.commits[2].files_touched, Some(0));
    }

    #[test]
    fn renamed_paths_are_kept_verbatim() {
        let log = "__COMMIT__abc|Ada|1|Move\n0\t0\tsrc/{old => new}/mod.rs\n";
        let parsed = parse_log(log.as_bytes(), LogFormat::Numstat, &options()).unwrap();
        assert_eq!(parsed.touches.get("src/{old => new}/mod.rs"), Some(1));
    }

    #[test]
    fn malformed_lines_do_not_attach_to_previous_commit() {
        let log = "\
__COMMIT__aaaaaaa|Ada|100|Good
1\t1\ta.txt
__COMMIT__broken header
7\t7\tb.txt
x\t1\tc.txt
__COMMIT__bbbbbbb|Bob|200|Also good
two-fields\tonly
2\t0\td.txt
";
        let parsed = parse_log(log.as_bytes(), LogFormat::Numstat, &options()).unwrap();

        assert_eq!(parsed.commits.len(), 2);
        assert_eq!(parsed.commits[0].lines_added, 1);
        assert_eq!(parsed.commits[1].lines_added, 2);
        assert_eq!(parsed.touches.get("b.txt"), None);

        let reasons: Vec<_> = parsed.warnings.iter().map(|w| w.reason).collect();
        assert_eq!(
            reasons,
            vec![
                WarningReason::MalformedHeader,
                WarningReason::OrphanLine,
                WarningReason::OrphanLine,
                WarningReason::UnrecognizedLine,
            ]
        );
    }

    #[test]
    fn counts_accept_placeholder_and_digits_only() {
        assert_eq!(parse_count("-"), Some(0));
        assert_eq!(parse_count("12"), Some(12));
        assert_eq!(parse_count("-3"), None);
        assert_eq!(parse_count("abc"), None);
    }
}
