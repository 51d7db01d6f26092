use katara_common::{Diagnostic, Position, Span};

#[test]
fn position_advance_tracks_lines_and_columns() {
    let mut pos = Position::start();
    for byte in b"ab\ncd" {
        pos = pos.advance(*byte);
    }
    assert_eq!(pos.line, 2);
    assert_eq!(pos.column, 3);
    assert_eq!(pos.offset, 5);
}

#[test]
fn span_merge_takes_the_widest_bounds() {
    let a = Span::new(Position { line: 1, column: 1, offset: 0 }, Position { line: 1, column: 5, offset: 4 });
    let b = Span::new(Position { line: 2, column: 1, offset: 10 }, Position { line: 2, column: 3, offset: 12 });
    let merged = a.merge(b);
    assert_eq!(merged.start, a.start);
    assert_eq!(merged.end, b.end);
}

#[test]
fn diagnostic_display_includes_severity_and_span() {
    let span = Span::new(Position::start(), Position::start());
    let diag = Diagnostic::error("value used before definition", span);
    let rendered = diag.to_string();
    assert!(rendered.starts_with("error:"));
    assert!(rendered.contains("value used before definition"));
}
