use criterion::{black_box, criterion_group, criterion_main, Criterion};
use kpi_core::association::{AssociationConfig, AssociationPolicy, Associator};
use kpi_core::geometry::{Geometry, Point2D, Polygon};

/// A row of `n` perpendicular slots, optionally shifted to mimic detections.
fn make_slots(n: usize, shift: f64) -> Vec<Geometry> {
    (0..n)
        .map(|i| {
            let x = i as f64 * 2.7 + shift;
            let y = (i % 7) as f64 * 0.05;
            Polygon::new(vec![
                Point2D::new(x, y),
                Point2D::new(x + 2.5, y),
                Point2D::new(x + 2.5, y + 5.0),
                Point2D::new(x, y + 5.0),
            ])
            .unwrap()
            .into()
        })
        .collect()
}

fn bench_association(c: &mut Criterion) {
    let mut group = c.benchmark_group("association");

    for n in [10, 50, 200] {
        let gt = make_slots(n, 0.0);
        let det = make_slots(n, 0.3);
        for policy in [AssociationPolicy::Greedy, AssociationPolicy::Optimal] {
            let assoc = Associator::new(AssociationConfig::parking_slot().with_policy(policy)).unwrap();
            group.bench_function(format!("{policy:?}_{n}_slots"), |b| {
                b.iter(|| black_box(assoc.associate(&det, &gt)));
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_association);
criterion_main!(benches);
