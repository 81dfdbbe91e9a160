use criterion::criterion_main;


criterion_main!(churn::benches, scan::benches);
