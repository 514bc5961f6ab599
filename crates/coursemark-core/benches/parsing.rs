use std::fmt::Write;
use std::path::Path;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use coursemark_core::parser::{parse_course_str, validate_course};

fn course_toml(lessons: usize) -> String {
    let mut toml = String::from("[course]\nid = \"bench\"\ntitle = \"Bench\"\n");
    for i in 0..lessons {
        let _ = write!(
            toml,
            "\n[[lessons]]\nid = \"exam-{i}\"\ntype = \"exam\"\npassing_score = 70\n"
        );
        for q in 0..5 {
            let _ = write!(
                toml,
                "\n[[lessons.questions]]\nprompt = \"Q{q}\"\n\
                 options = [\"a\", \"b\", \"c\"]\ncorrect_option = {}\n",
                q % 3
            );
        }
    }
    toml
}

fn bench_parse_course(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_course");

    for lessons in [5, 50] {
        let toml = course_toml(lessons);
        group.bench_function(format!("lessons={lessons}"), |b| {
            b.iter(|| parse_course_str(black_box(&toml), Path::new("bench.toml")))
        });
    }

    let course = parse_course_str(&course_toml(50), Path::new("bench.toml"));
    if let Ok(course) = course {
        group.bench_function("validate/lessons=50", |b| {
            b.iter(|| validate_course(black_box(&course)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_parse_course);
criterion_main!(benches);
