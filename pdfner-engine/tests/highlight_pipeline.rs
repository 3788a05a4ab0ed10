use std::sync::Mutex;

use pdfner_core::annotation::HighlightAnnotation;
use pdfner_core::entity::{Entity, EntityType};
use pdfner_core::geometry::Rect;
use pdfner_core::layout::PageLayout;
use pdfner_engine::glyph::UniformWidths;
use pdfner_engine::locate::{FuzzyLocator, MatchStrategy};
use pdfner_engine::{
    AnnotationWriter, GeometrySource, Highlighter, Selection, WriterChain,
};

const SNIPPET: &str = "fine-tune BERT on GLUE";

fn results_page() -> PageLayout {
    serde_json::from_str(
        r#"{
            "pageIndex": 4,
            "runs": [
                {"text": "Results. We fine-tune", "x": 72, "y": 700, "width": 210, "height": 10, "hasEol": true},
                {"text": "BERT on GLUE and", "x": 72, "y": 686, "width": 160, "height": 10, "hasEol": true},
                {"text": "report accuracy.", "x": 72, "y": 672, "width": 160, "height": 10}
            ]
        }"#,
    )
    .expect("解析页面排版失败")
}

fn selection() -> Selection {
    Selection::new(
        SNIPPET,
        4,
        vec![
            Rect::new(192.0, 697.5, 282.0, 707.5),
            Rect::new(72.0, 683.5, 192.0, 693.5),
        ],
    )
}

fn entities() -> Vec<Entity> {
    vec![
        Entity::new("BERT", EntityType::Method, 10, 14),
        Entity::new("GLUE", EntityType::Dataset, 18, 22),
        Entity::new("fine-tune BERT", EntityType::Task, 0, 14),
    ]
}

fn uniform_highlighter() -> Highlighter {
    Highlighter::new(Box::new(UniformWidths), Box::new(FuzzyLocator::default()))
}

#[test]
fn page_layout_anchors_snippet_across_line_break() {
    let page = results_page();
    let plan = uniform_highlighter().plan(&selection(), Some(&page), &entities());

    assert_eq!(plan.skipped, 0);
    assert!(
        plan.sources
            .iter()
            .all(|source| *source == GeometrySource::Page(MatchStrategy::Normalized))
    );

    let bert = &plan.annotations[0];
    assert_eq!(bert.color, "#2ea8e5");
    assert_eq!(bert.position.page_index, 4);
    assert_eq!(bert.position.rects, vec![Rect::new(72.0, 683.5, 112.0, 693.5)]);

    let glue = &plan.annotations[1];
    assert_eq!(glue.position.rects, vec![Rect::new(152.0, 683.5, 192.0, 693.5)]);

    let spanning = &plan.annotations[2];
    assert_eq!(
        spanning.position.rects,
        vec![
            Rect::new(192.0, 697.5, 282.0, 707.5),
            Rect::new(72.0, 683.5, 112.0, 693.5),
        ]
    );
}

#[test]
fn unlocatable_snippet_falls_back_to_selection_rects() {
    let unrelated: PageLayout = serde_json::from_str(
        r#"{"pageIndex": 4, "runs": [{"text": "Appendix A. Proofs of the lemmas", "x": 72, "y": 700, "width": 300, "height": 10}]}"#,
    )
    .expect("解析页面排版失败");
    let selection = selection();
    let plan = Highlighter::default().plan(&selection, Some(&unrelated), &entities());

    assert_eq!(plan.skipped, 0);
    assert_eq!(plan.annotations.len(), 3);
    assert!(
        plan.sources
            .iter()
            .all(|source| *source == GeometrySource::Interpolated)
    );

    let left = selection.rects[1].x1();
    let right = selection.rects[0].x2();
    for annotation in &plan.annotations {
        assert!(!annotation.position.rects.is_empty());
        for rect in &annotation.position.rects {
            assert!(rect.x1() >= left - 1e-9 && rect.x2() <= right + 1e-9);
            assert!(rect.x1() <= rect.x2());
        }
    }
}

#[derive(Default)]
struct Collecting {
    seen: Mutex<Vec<HighlightAnnotation>>,
}

impl AnnotationWriter for &'static Collecting {
    fn name(&self) -> &'static str {
        "collecting"
    }

    fn write(&self, annotation: &HighlightAnnotation) -> bool {
        self.seen.lock().expect("锁已中毒").push(annotation.clone());
        true
    }
}

#[test]
fn planned_highlights_reach_writer_in_entity_order() {
    let sink: &'static Collecting = Box::leak(Box::default());
    let mut chain = WriterChain::new();
    chain.register(sink);

    let page = results_page();
    let plan = uniform_highlighter().plan(&selection(), Some(&page), &entities());
    let report = chain.write_all(&plan.annotations);

    assert_eq!(report.written, 3);
    assert_eq!(report.failed, 0);
    let texts: Vec<String> = sink
        .seen
        .lock()
        .expect("锁已中毒")
        .iter()
        .map(|annotation| annotation.text.clone())
        .collect();
    assert_eq!(texts, vec!["BERT", "GLUE", "fine-tune BERT"]);
}
