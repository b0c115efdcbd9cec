use stampede_net::buffer::SegmentedBuffer;

#[test]
fn should_round_trip_appends_across_chunk_boundaries() {
    let mut buffer = SegmentedBuffer::new(8);
    let mut expected: Vec<u8> = Vec::new();

    // Append in sizes that land before, on, and after chunk boundaries.
    for (index, size) in [1usize, 7, 8, 9, 3, 16, 5].iter().enumerate() {
        let piece: Vec<u8> = (0..*size).map(|i| (index * 16 + i) as u8).collect();
        buffer.append(&piece);
        expected.extend_from_slice(&piece);
    }

    assert_eq!(buffer.len(), expected.len());
    assert_eq!(buffer.get_bytes(0, buffer.len()), expected);
    assert_eq!(buffer.to_vec(), expected);
}

#[test]
fn should_append_nothing_for_empty_input() {
    let mut buffer = SegmentedBuffer::new(8);
    buffer.append(b"");
    assert_eq!(buffer.len(), 0);
    buffer.append(b"abc");
    buffer.append(b"");
    assert_eq!(buffer.to_vec(), b"abc");
}

#[test]
fn should_behave_like_fresh_buffer_after_clear() {
    let mut reused = SegmentedBuffer::new(8);
    reused.append(b"some earlier content that spans chunks");
    reused.clear();
    assert_eq!(reused.len(), 0);

    let mut fresh = SegmentedBuffer::new(8);
    for piece in [&b"first"[..], &b" and"[..], &b" second"[..]] {
        reused.append(piece);
        fresh.append(piece);
    }
    assert_eq!(reused.to_vec(), fresh.to_vec());
    assert_eq!(reused.len(), fresh.len());
}

#[test]
fn should_copy_partial_ranges_spanning_chunks() {
    let mut buffer = SegmentedBuffer::new(4);
    buffer.append(b"0123456789");

    assert_eq!(buffer.get_bytes(3, 5), b"34567");
    assert_eq!(buffer.byte_at(8), b'8');

    let mut dest = [0u8; 16];
    let copied = buffer.copy_to_slice(6, &mut dest);
    assert_eq!(copied, 4);
    assert_eq!(&dest[..copied], b"6789");
}

#[test]
fn should_allow_empty_range_at_end_of_buffer() {
    let mut buffer = SegmentedBuffer::new(8);
    buffer.append(b"abc");
    assert_eq!(buffer.get_bytes(3, 0), Vec::<u8>::new());
    assert_eq!(buffer.index_of(b"abc", 3), None);
}

#[test]
fn should_find_pattern_straddling_chunk_boundary() {
    // Chunk size 8 with the pattern at offset 5 places the split after
    // its third byte.
    let mut buffer = SegmentedBuffer::new(8);
    buffer.append(b"xxxxxboundaryyyy");
    assert_eq!(buffer.index_of(b"boundary", 0), Some(5));

    // The same pattern placed fully inside one chunk matches identically.
    let mut aligned = SegmentedBuffer::new(32);
    aligned.append(b"xxxxxboundaryyyy");
    assert_eq!(aligned.index_of(b"boundary", 0), Some(5));

    assert_eq!(buffer.index_of(b"boundary", 6), None);
    assert_eq!(buffer.index_of(b"missing", 0), None);
}

#[test]
fn should_check_tail_with_ends_with() {
    let mut buffer = SegmentedBuffer::new(4);
    buffer.append(b"<record>payload</record>\n");
    assert!(buffer.ends_with(b"</record>\n"));
    assert!(!buffer.ends_with(b"</log>\n"));
    assert!(!buffer.ends_with(b"longer than the whole buffer content here"));
}

#[test]
fn should_locate_eol_and_following_bol() {
    let mut buffer = SegmentedBuffer::new(4);
    buffer.append(b"abc\r\ndef\n");

    let eol = buffer.index_of_eol(0).unwrap();
    assert_eq!(eol, 3);
    assert_eq!(buffer.byte_at(eol), b'\r');

    let bol = buffer.index_of_bol(eol).unwrap();
    assert_eq!(bol, 5);
    assert_eq!(buffer.byte_at(bol), b'd');

    let second_eol = buffer.index_of_eol(bol).unwrap();
    assert_eq!(second_eol, 8);
    assert_eq!(buffer.index_of_bol(second_eol), Some(buffer.len()));
    assert_eq!(buffer.index_of_eol(buffer.len()), None);
}

#[test]
fn should_handle_crlf_split_across_chunks() {
    // Chunk size 4 puts the CR at the end of the first chunk and the LF at
    // the start of the second.
    let mut buffer = SegmentedBuffer::new(4);
    buffer.append(b"abc\r\ndef");

    let eol = buffer.index_of_eol(0).unwrap();
    assert_eq!(eol, 3);
    assert_eq!(buffer.index_of_bol(eol), Some(5));
}

#[test]
fn should_tokenize_lines() {
    let mut buffer = SegmentedBuffer::new(4);
    buffer.append(b"first\r\nsecond\nthird");

    let mut tokenizer = buffer.tokenizer();
    assert_eq!(tokenizer.get_line().unwrap(), b"first");
    assert_eq!(tokenizer.get_line().unwrap(), b"second");
    assert_eq!(tokenizer.get_line(), None);
    assert_eq!(tokenizer.get_trimmed_remainder().unwrap(), "third");
    assert!(tokenizer.end_of_data());
    assert_eq!(tokenizer.get_trimmed_remainder(), None);
}

#[test]
fn should_tokenize_on_delimiters() {
    let mut buffer = SegmentedBuffer::new(4);
    buffer.append(b"alpha beta  gamma");

    let mut tokenizer = buffer.tokenizer();
    assert_eq!(tokenizer.next_token(b" ").unwrap(), "alpha");
    assert_eq!(tokenizer.next_token(b" ").unwrap(), "beta");
    assert_eq!(tokenizer.next_token(b" ").unwrap(), "gamma");
    assert!(tokenizer.end_of_data());
    assert_eq!(tokenizer.next_token(b" "), None);
}

#[test]
fn should_compact_remainder_on_flip() {
    let mut buffer = SegmentedBuffer::new(4);
    buffer.append(b"one\ntwo\npartial");

    let mut tokenizer = buffer.tokenizer();
    assert_eq!(tokenizer.get_line().unwrap(), b"one");
    assert_eq!(tokenizer.get_line().unwrap(), b"two");
    tokenizer.flip();
    assert_eq!(tokenizer.position(), 0);

    assert_eq!(buffer.to_vec(), b"partial");

    // The buffer keeps working normally after compaction.
    buffer.append(b" data\n");
    assert_eq!(buffer.to_vec(), b"partial data\n");
}

#[test]
fn should_treat_flip_at_end_of_data_as_clear() {
    let mut buffer = SegmentedBuffer::new(4);
    buffer.append(b"line one\nline two\n");

    let mut tokenizer = buffer.tokenizer();
    while tokenizer.get_line().is_some() {}
    assert!(tokenizer.end_of_data());
    tokenizer.flip();

    assert_eq!(buffer.len(), 0);
    buffer.append(b"fresh");
    assert_eq!(buffer.to_vec(), b"fresh");
}

#[test]
fn should_write_buffer_to_writer_without_joining() {
    let mut buffer = SegmentedBuffer::new(4);
    buffer.append(b"0123456789ab");
    buffer.append(b"cd");

    let mut sink: Vec<u8> = Vec::new();
    let written = buffer.write_to(&mut sink).unwrap();
    assert_eq!(written, 14);
    assert_eq!(sink, b"0123456789abcd");
}
