use stampede_logserver::protocol::{detect, Detection, UnsupportedProtocol};

#[test]
fn should_need_more_bytes_while_candidates_remain_ambiguous() {
    assert_eq!(detect(b""), Ok(Detection::Insufficient));
    assert_eq!(detect(b"<"), Ok(Detection::Insufficient));
}

#[test]
fn should_detect_record_header_at_first_distinguishing_byte() {
    // "<r" already rules out "<?xml" and "</log>".
    assert_eq!(detect(b"<r"), Ok(Detection::Match(0)));
    assert_eq!(detect(b"<record>"), Ok(Detection::Match(0)));
}

#[test]
fn should_detect_xml_declaration_at_first_distinguishing_byte() {
    assert_eq!(detect(b"<?"), Ok(Detection::Match(1)));
    assert_eq!(detect(b"<?xml version=\"1.0\"?>"), Ok(Detection::Match(1)));
}

#[test]
fn should_detect_log_close_at_first_distinguishing_byte() {
    assert_eq!(detect(b"</"), Ok(Detection::Match(2)));
    assert_eq!(detect(b"</log>"), Ok(Detection::Match(2)));
}

#[test]
fn should_reject_unrecognized_first_byte() {
    assert_eq!(detect(b"X"), Err(UnsupportedProtocol));
    assert_eq!(detect(b"GET / HTTP/1.1\r\n"), Err(UnsupportedProtocol));
}

#[test]
fn should_reject_mismatch_after_shared_prefix() {
    assert_eq!(detect(b"<x"), Err(UnsupportedProtocol));
}

#[test]
fn should_keep_matching_once_detected() {
    // Bytes beyond the header never change the outcome.
    assert_eq!(detect(b"<record><message>hi"), Ok(Detection::Match(0)));
}
