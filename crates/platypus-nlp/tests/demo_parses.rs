//! The bundled demo parses, read as a parser service would serve them.

use platypus_nlp::{parse_conllu, NlpParser, ParseError, StaticParser, UdPos};

const DEMO_PARSES: &str = include_str!("../../../demos/parses.conllu");

#[test]
fn every_demo_sentence_is_a_tree() {
    let trees = parse_conllu(DEMO_PARSES).unwrap();
    assert!(trees.len() >= 10);
    for tree in &trees {
        let root = tree.root();
        assert_eq!(root.head, 0, "{}", tree.text());
        for token in tree.tokens() {
            assert!(tree.dominates(root.id, token.id) || token.id == root.id);
        }
    }
}

#[test]
fn questions_end_with_punctuation_attached_to_the_root() {
    for tree in parse_conllu(DEMO_PARSES).unwrap() {
        let Some(last) = tree.tokens().last() else {
            continue;
        };
        if last.pos == UdPos::Punct {
            assert_eq!(last.head, tree.root().id, "{}", tree.text());
        }
    }
}

#[tokio::test]
async fn static_parser_ignores_case_and_final_punctuation() {
    let parser = StaticParser::from_conllu_document(DEMO_PARSES).unwrap();
    let trees = parser
        .parse("what is the capital of france", "en")
        .await
        .unwrap();
    assert_eq!(trees.len(), 1);
    assert_eq!(trees[0].text(), "What is the capital of France?");

    let unknown = parser.parse("What is the capital of Spain?", "en").await;
    assert!(matches!(unknown, Err(ParseError::Unavailable(_))));
}
