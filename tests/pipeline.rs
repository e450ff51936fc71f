use std::fs;

use bytepair::{
    artifact_paths, load_vocab_and_merges, save_vocab_and_merges, train_bpe, train_bpe_from_file,
    MergeRule, Tokenizer, TrainerConfig,
};

const EOT: &str = "<|endoftext|>";

const CORPUS: &str = "low low low low low lower lower widest widest widest newest newest newest newest newest newest<|endoftext|>the cat sat on the mat<|endoftext|>the cat ate the rat";

fn config(vocab_size: usize) -> TrainerConfig {
    TrainerConfig::new(vocab_size, vec![EOT.to_owned()])
}

#[test]
fn test_train_save_load_encode() {
    let dir = tempfile::tempdir().expect("tempdir failed");
    let corpus_path = dir.path().join("corpus.txt");
    fs::write(&corpus_path, CORPUS).expect("write corpus failed");

    let out = train_bpe_from_file(&corpus_path, &config(300)).expect("training failed");
    assert!(!out.merges.is_empty());
    assert_eq!(out.vocab.len(), 257 + out.merges.len());

    let (vocab_path, merges_path) = artifact_paths(dir.path().join("model"), "tiny");
    save_vocab_and_merges(&out.vocab, &out.merges, &vocab_path, &merges_path)
        .expect("save failed");
    let (vocab, merges) = load_vocab_and_merges(&vocab_path, &merges_path).expect("load failed");
    assert_eq!(vocab, out.vocab);
    assert_eq!(merges, out.merges);

    let tokenizer =
        Tokenizer::from_files(&vocab_path, &merges_path, &[EOT]).expect("tokenizer load failed");

    let ids = tokenizer.encode(CORPUS).expect("encode failed");
    assert!(ids.len() < CORPUS.len());
    assert_eq!(tokenizer.decode(&ids).expect("decode failed"), CORPUS);

    let eot_id = tokenizer.token_to_id(EOT.as_bytes()).expect("special token id");
    assert_eq!(tokenizer.encode(EOT).expect("encode failed"), vec![eot_id]);
    assert_eq!(ids.iter().filter(|&&id| id == eot_id).count(), 2);
}

#[test]
fn test_unseen_text_round_trips() {
    let out = train_bpe(CORPUS, &config(280)).expect("training failed");
    let tokenizer = Tokenizer::new(out.vocab, out.merges, &[EOT]).expect("tokenizer init failed");

    let text = "Brand-new façade, 日本語 and emoji 🚀 at 3:45pm\r\n\ttabs   and spaces ";
    let ids = tokenizer.encode(text).expect("encode failed");
    assert_eq!(tokenizer.decode(&ids).expect("decode failed"), text);
}

#[test]
fn test_merged_tokens_never_contain_special_token() {
    let out = train_bpe(CORPUS, &config(400)).expect("training failed");
    for rule in &out.merges {
        let merged = String::from_utf8_lossy(&rule.merged()).into_owned();
        assert!(!merged.contains("<|"), "merge crossed a special token: {merged:?}");
    }
}

#[test]
fn test_invalid_utf8_tokens_survive_save_load() {
    let dir = tempfile::tempdir().expect("tempdir failed");
    let (vocab_path, merges_path) = artifact_paths(dir.path(), "bytes");

    // a merge across the bytes of "€" yields a token that is not valid UTF-8
    let out = train_bpe("€€€ €€", &TrainerConfig::new(258, Vec::new())).expect("training failed");
    assert_eq!(out.merges[0], MergeRule::new(vec![0xE2], vec![0x82]));

    save_vocab_and_merges(&out.vocab, &out.merges, &vocab_path, &merges_path)
        .expect("save failed");
    let (vocab, merges) = load_vocab_and_merges(&vocab_path, &merges_path).expect("load failed");
    assert_eq!(vocab, out.vocab);
    assert_eq!(merges, out.merges);
}

#[test]
fn test_encode_iterable_over_lines() {
    let out = train_bpe(CORPUS, &config(300)).expect("training failed");
    let tokenizer = Tokenizer::new(out.vocab, out.merges, &[EOT]).expect("tokenizer init failed");

    let lines: Vec<&str> = CORPUS.split_inclusive(' ').collect();
    let streamed: Vec<_> = tokenizer
        .encode_iterable(lines.iter().copied())
        .collect::<bytepair::Result<_>>()
        .expect("streaming encode failed");
    assert_eq!(tokenizer.decode(&streamed).expect("decode failed"), CORPUS);
}
