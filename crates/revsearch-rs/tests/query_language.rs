//! Query language over a real index: aliases, heuristics, wildcard
//! expansion limits, case folding.

mod common;

use common::*;
use revsearch_rs::Revision;

fn sample_index() -> (tempfile::TempDir, revsearch_rs::Index) {
    index_history(history(vec![
        rev_by(1, "Alice", vec![
            add("/src/zoo.cpp", "the big grey elephant"),
            add("/src/tier.cpp", "der grosse graue Elefant"),
        ]),
        rev_by(2, "bob", vec![
            add("/doc/animals.txt", "ein kleiner elefant"),
            with_properties(
                add_dir("/vendor/"),
                &[("svn:externals", "Common/Lib http://server/svn/lib\nTools svn://server/tools")],
            ),
            with_properties(
                add("/logo.png", "\u{1}\u{2}"),
                &[("svn:mime-type", "image/png")],
            ),
            add("/main/app.txt", "entry point"),
            add("/notes.txt", "main loop detail"),
        ]),
    ]))
}

fn heads(index: &revsearch_rs::Index, query: &str) -> Vec<String> {
    let mut paths: Vec<String> = index
        .query(query, Revision::HEAD, Revision::HEAD)
        .unwrap()
        .hits
        .into_iter()
        .map(|h| h.path)
        .collect();
    paths.sort();
    paths
}

#[test]
fn wildcards_match_across_case_variants() {
    let (_dir, index) = sample_index();
    assert_eq!(
        heads(&index, "c:El*ant"),
        vec!["/doc/animals.txt", "/src/tier.cpp", "/src/zoo.cpp"]
    );
}

#[test]
fn bare_terms_split_between_path_and_content() {
    let (_dir, index) = sample_index();
    assert_eq!(heads(&index, "elephant"), vec!["/src/zoo.cpp"]);
    assert_eq!(heads(&index, "*.cpp"), vec!["/src/tier.cpp", "/src/zoo.cpp"]);
    assert_eq!(heads(&index, "/doc/"), vec!["/doc/animals.txt"]);
}

#[test]
fn bare_terms_match_path_components_and_content() {
    let (_dir, index) = sample_index();
    // "main" is a directory in one hit and file content in the other.
    assert_eq!(
        heads(&index, "main"),
        vec!["/main/app.txt", "/notes.txt"]
    );
}

#[test]
fn author_and_type_aliases() {
    let (_dir, index) = sample_index();
    assert_eq!(
        heads(&index, "a:alice"),
        vec!["/src/tier.cpp", "/src/zoo.cpp"]
    );
    assert_eq!(heads(&index, "t:image*"), vec!["/logo.png"]);
    assert_eq!(heads(&index, "mime-type:image/png"), vec!["/logo.png"]);
}

#[test]
fn externals_components_are_searchable() {
    let (_dir, index) = sample_index();
    assert_eq!(heads(&index, "e:tools"), vec!["/vendor/"]);
    assert_eq!(heads(&index, "x:common/lib"), vec!["/vendor/"]);
    assert_eq!(heads(&index, "e:nothing"), Vec::<String>::new());
}

#[test]
fn binary_files_skip_content_but_keep_metadata() {
    let (_dir, index) = sample_index();
    assert_eq!(heads(&index, "p:logo.png"), vec!["/logo.png"]);
    // Raw bytes never land in the content field.
    assert_eq!(heads(&index, "c:\u{1}\u{2}"), Vec::<String>::new());
}

#[test]
fn operators_and_groups_compose() {
    let (_dir, index) = sample_index();
    assert_eq!(heads(&index, "c:elefant -a:bob"), vec!["/src/tier.cpp"]);
    assert_eq!(
        heads(&index, "#c:elephant #c:grosse"),
        vec!["/src/tier.cpp", "/src/zoo.cpp"]
    );
    assert_eq!(heads(&index, "c:(graue Elefant)"), vec!["/src/tier.cpp"]);
}

#[test]
fn oversized_wildcard_expansions_are_fatal() {
    let mut words = String::new();
    for i in 0..1100 {
        words.push_str(&format!("w{i:04} "));
    }
    let (_dir, index) = index_history(history(vec![rev(1, vec![add("/words.txt", &words)])]));

    let err = index
        .query("c:w*", Revision::HEAD, Revision::HEAD)
        .unwrap_err();
    assert!(err.to_string().contains("too many matches"));
    // A narrower pattern stays under the cap.
    assert_eq!(
        heads(&index, "c:w000*"),
        vec!["/words.txt"]
    );
}

#[test]
fn single_revision_mode_keeps_only_head_documents() {
    let full = history(vec![
        rev(1, vec![add("/a.txt", "one")]),
        rev(2, vec![modify("/a.txt", "two")]),
        rev(3, vec![add("/b.txt", "three"), delete("/b.txt")]),
    ]);
    let (_dir, index) = index_history_with(full, |options| {
        options.single_revision = true;
    });
    assert!(index.properties().single_revision);
    assert_eq!(
        windows_of(&index, "/a.txt"),
        vec![("2".to_string(), "head".to_string())]
    );
    assert!(windows_of(&index, "/b.txt").is_empty());
    // No revision metadata documents either.
    assert!(index
        .query("m:change", Revision::ALL, Revision::ALL)
        .unwrap()
        .hits
        .is_empty());
}
