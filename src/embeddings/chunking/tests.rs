use super::*;

fn config(chunk_size: usize, chunk_overlap: usize) -> ChunkingConfig {
    ChunkingConfig {
        chunk_size,
        chunk_overlap,
    }
}

fn char_slice(text: &str, offset: usize, len: usize) -> String {
    text.chars().skip(offset).take(len).collect()
}

const ARTICLE: &str = "Vector databases store embeddings next to the source text.\n\n\
Each embedding is a list of floating point numbers produced by a model. Similar passages end up close together.\n\n\
A retriever embeds the question, asks the database for the nearest passages and hands them to the language model.\n\
The model then answers using only that context, which keeps it grounded in the documents that were ingested.";

#[test]
fn short_text_is_one_chunk() {
    let document = Document::new("A short page.", "data/short.pdf", 0);
    let chunks = chunk_document(&document, &ChunkingConfig::default()).expect("should chunk");

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].text, "A short page.");
    assert_eq!(chunks[0].metadata.offset, 0);
    assert_eq!(chunks[0].metadata.source, "data/short.pdf");
}

#[test]
fn blank_text_has_no_chunks() {
    let document = Document::new(" \n\n\t ", "data/blank.pdf", 3);
    let chunks = chunk_document(&document, &ChunkingConfig::default()).expect("should chunk");
    assert!(chunks.is_empty());
}

#[test]
fn windows_are_bounded_exact_substrings() {
    let windows = split_text(ARTICLE, &config(80, 20)).expect("should split");

    assert!(windows.len() > 3);
    for window in &windows {
        let len = window.text.chars().count();
        assert!(len <= 80, "window too long: {len}");
        assert!(!window.text.is_empty());
        assert_eq!(window.text, char_slice(ARTICLE, window.offset, len));
        assert!(!window.text.starts_with(char::is_whitespace));
        assert!(!window.text.ends_with(char::is_whitespace));
    }
}

#[test]
fn windows_cover_all_text() {
    let windows = split_text(ARTICLE, &config(80, 20)).expect("should split");

    let total = ARTICLE.chars().count();
    let mut covered = vec![false; total];
    for window in &windows {
        let len = window.text.chars().count();
        for flag in covered.iter_mut().skip(window.offset).take(len) {
            *flag = true;
        }
    }

    for (index, c) in ARTICLE.chars().enumerate() {
        assert!(
            covered[index] || c.is_whitespace(),
            "character {index} ({c:?}) is not in any chunk"
        );
    }
}

#[test]
fn consecutive_windows_overlap_and_advance() {
    let windows = split_text(ARTICLE, &config(80, 20)).expect("should split");

    for pair in windows.windows(2) {
        let previous_end = pair[0].offset + pair[0].text.chars().count();
        assert!(pair[1].offset > pair[0].offset);
        assert!(pair[1].offset <= previous_end, "gap between chunks");
    }
}

#[test]
fn prefers_paragraph_breaks() {
    let text = format!("{}\n\n{}", "a".repeat(50), "b ".repeat(40));
    let windows = split_text(&text, &config(80, 10)).expect("should split");

    assert_eq!(windows[0].text, "a".repeat(50));
}

#[test]
fn next_window_starts_on_a_word() {
    let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa lambda mu";
    let windows = split_text(text, &config(30, 12)).expect("should split");

    for window in windows.iter().skip(1) {
        let before = char_slice(text, window.offset - 1, 1);
        assert_eq!(before, " ", "window at {} starts mid-word", window.offset);
    }
}

#[test]
fn hard_cut_without_whitespace() {
    let text = "x".repeat(250);
    let windows = split_text(&text, &config(100, 20)).expect("should split");

    let offsets: Vec<usize> = windows.iter().map(|w| w.offset).collect();
    assert_eq!(offsets, vec![0, 80, 160]);
    assert_eq!(windows[0].text.len(), 100);
    assert_eq!(windows[2].text.len(), 90);
}

#[test]
fn zero_overlap_partitions_text() {
    let text = "x".repeat(25);
    let windows = split_text(&text, &config(10, 0)).expect("should split");

    let lengths: Vec<usize> = windows.iter().map(|w| w.text.len()).collect();
    assert_eq!(lengths, vec![10, 10, 5]);
}

#[test]
fn offsets_count_characters_not_bytes() {
    let text = "é".repeat(30);
    let windows = split_text(&text, &config(10, 2)).expect("should split");

    assert_eq!(windows[1].offset, 8);
    assert_eq!(windows[0].text.chars().count(), 10);
}

#[test]
fn chunking_is_deterministic() {
    let documents = vec![
        Document::new(ARTICLE, "data/a.pdf", 0),
        Document::new(ARTICLE, "data/a.pdf", 1),
    ];
    let first = chunk_documents(&documents, &config(90, 30)).expect("should chunk");
    let second = chunk_documents(&documents, &config(90, 30)).expect("should chunk");

    assert_eq!(first, second);
}

#[test]
fn record_ids_follow_source_page_and_offset() {
    let documents = vec![
        Document::new(ARTICLE, "data/a.pdf", 0),
        Document::new(ARTICLE, "data/a.pdf", 1),
    ];
    let chunks = chunk_documents(&documents, &config(90, 30)).expect("should chunk");

    let mut ids: Vec<Uuid> = chunks.iter().map(Chunk::record_id).collect();
    let total = ids.len();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), total, "record ids must be unique");

    let metadata = ChunkMetadata {
        source: "data/a.pdf".to_string(),
        page: 0,
        offset: 0,
    };
    assert_eq!(chunks[0].record_id(), metadata.record_id());
    assert_eq!(chunks[0].index, 0);
}

#[test]
fn invalid_config_is_rejected() {
    assert!(matches!(
        split_text("text", &config(0, 0)),
        Err(ConfigError::InvalidChunkSize(0))
    ));
    assert!(matches!(
        split_text("text", &config(10, 10)),
        Err(ConfigError::OverlapTooLarge { .. })
    ));
}
