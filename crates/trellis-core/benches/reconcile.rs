use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use trellis_core::html::parse_fragment;
use trellis_core::{reconcile_children, Document, NodeId};

const ROW_SAMPLES: &[usize] = &[16, 64, 256];

fn list_markup(rows: usize, rotate: usize, label: &str) -> String {
    let mut html = String::from("<ul>");
    for i in 0..rows {
        let key = (i + rotate) % rows;
        html.push_str(&format!(
            r#"<li data-key="{key}"><span>{label} {key}</span><button @click="select">x</button></li>"#
        ));
    }
    html.push_str("</ul>");
    html
}

struct ListFixture {
    doc: Document,
    host: NodeId,
}

impl ListFixture {
    fn new(rows: usize) -> Self {
        let mut doc = Document::new();
        let host = doc.create_element("x-list");
        let body = doc.body();
        doc.append_child(body, host).expect("mount host");
        let mut fixture = Self { doc, host };
        fixture.render(&list_markup(rows, 0, "Item"));
        fixture
    }

    fn render(&mut self, html: &str) {
        let nodes = parse_fragment(&mut self.doc, html);
        reconcile_children(&mut self.doc, self.host, &nodes).expect("reconcile");
    }
}

fn bench_identical(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile_identical");
    for &rows in ROW_SAMPLES {
        let markup = list_markup(rows, 0, "Item");
        group.bench_with_input(BenchmarkId::new("rows", rows), &markup, |b, markup| {
            let mut fixture = ListFixture::new(rows);
            b.iter(|| {
                fixture.render(markup);
                black_box(fixture.doc.mutation_count());
            });
        });
    }
    group.finish();
}

fn bench_rotate(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile_rotate");
    for &rows in ROW_SAMPLES {
        let frames: Vec<String> = (0..4)
            .map(|step| list_markup(rows, step, "Row"))
            .collect();
        group.bench_with_input(BenchmarkId::new("rows", rows), &frames, |b, frames| {
            let mut fixture = ListFixture::new(rows);
            let mut frame = 0;
            b.iter(|| {
                frame = (frame + 1) % frames.len();
                fixture.render(&frames[frame]);
                black_box(fixture.doc.len());
            });
        });
    }
    group.finish();
}

criterion_group!(reconcile, bench_identical, bench_rotate);
criterion_main!(reconcile);
