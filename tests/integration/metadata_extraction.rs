use papercast::gateway::ModelGateway;
use papercast::metadata::{
    extract_abstract, extract_doi_link, MetadataExtractor, NO_ABSTRACT_SENTINEL,
};
use papercast::pipeline::RunAccumulator;

use super::{FakeModelClient, PipelineHarness, ScriptedResponse};

#[test]
fn convention_shaped_names_skip_the_model() {
    let harness = PipelineHarness::new();
    let settings = harness.settings();
    let client = FakeModelClient::returning("should never be used");
    let gateway = ModelGateway::new(&settings, client.clone());
    let extractor = MetadataExtractor::new(&settings, &gateway);
    let mut accumulator = RunAccumulator::new();

    let metadata = extractor.extract(
        "Smith (2020) Deep Learning Advances",
        "some paper text",
        &mut accumulator,
    );

    assert_eq!(metadata.author, "Smith");
    assert_eq!(metadata.year, 2020);
    assert_eq!(metadata.title, "Deep Learning Advances");
    assert_eq!(client.completion_count(), 0);
}

#[test]
fn fallback_asks_the_model_once_with_the_text_head() {
    let harness = PipelineHarness::new();
    let settings = harness.settings();
    let client = FakeModelClient::returning("Doe (2019) Inferred Title");
    let gateway = ModelGateway::new(&settings, client.clone());
    let extractor = MetadataExtractor::new(&settings, &gateway);
    let mut accumulator = RunAccumulator::new();

    let raw_text = "x".repeat(2500);
    let metadata = extractor.extract("scan_20240101", &raw_text, &mut accumulator);

    assert_eq!(metadata.author, "Doe");
    assert_eq!(metadata.year, 2019);
    assert_eq!(metadata.title, "Inferred Title");

    let completions = client.completions();
    assert_eq!(completions.len(), 1);
    assert_eq!(completions[0].prompt, "x".repeat(1000));
}

#[test]
fn a_double_miss_degrades_to_the_sentinel_record() {
    let harness = PipelineHarness::new();
    let settings = harness.settings();
    let client = FakeModelClient::returning("I could not find any of that, sorry!");
    let gateway = ModelGateway::new(&settings, client.clone());
    let extractor = MetadataExtractor::new(&settings, &gateway);
    let mut accumulator = RunAccumulator::new();

    let metadata = extractor.extract("scan_20240101", "opaque text", &mut accumulator);

    assert_eq!(metadata.author, "Unknown");
    assert_eq!(metadata.year, 0);
    assert_eq!(metadata.title, "Unknown");
    assert_eq!(client.completion_count(), 1);
}

#[test]
fn a_failed_fallback_call_also_degrades_to_the_sentinel() {
    let harness = PipelineHarness::new();
    let settings = harness.settings();
    let client = FakeModelClient::scripted(vec![ScriptedResponse::Fail], "unused");
    let gateway = ModelGateway::new(&settings, client.clone());
    let extractor = MetadataExtractor::new(&settings, &gateway);
    let mut accumulator = RunAccumulator::new();

    let metadata = extractor.extract("scan_20240101", "opaque text", &mut accumulator);

    assert_eq!(metadata.author, "Unknown");
    assert_eq!(metadata.year, 0);
    assert_eq!(metadata.title, "Unknown");
}

#[test]
fn doi_detection_is_independent_of_the_name_parse() {
    let harness = PipelineHarness::new();
    let settings = harness.settings();
    let client = FakeModelClient::returning("unused");
    let gateway = ModelGateway::new(&settings, client);
    let extractor = MetadataExtractor::new(&settings, &gateway);
    let mut accumulator = RunAccumulator::new();

    let text = "Published work, see 10.1109/ABC.2020.123 for details.";
    let metadata = extractor.extract("Smith (2020) Networks", text, &mut accumulator);
    assert_eq!(
        metadata.doi_link.as_deref(),
        Some("https://doi.org/10.1109/ABC.2020.123")
    );

    let metadata = extractor.extract("Smith (2020) Networks", "no identifier", &mut accumulator);
    assert_eq!(metadata.doi_link, None);
}

#[test]
fn doi_outside_the_search_window_is_ignored() {
    let text = format!("{}10.1109/ABC.2020.123", "y".repeat(10_000));
    assert_eq!(extract_doi_link(&text), None);
}

#[test]
fn abstract_extraction_is_idempotent() {
    let text = "Title page\n\nAbstract We study the effect of moisture on ducks.\n\nIntroduction follows";
    let first = extract_abstract(text);
    assert!(first.starts_with("We study the effect of moisture on ducks."));

    // Re-running on the already-extracted abstract finds no marker.
    assert_eq!(extract_abstract(&first), NO_ABSTRACT_SENTINEL);
}
