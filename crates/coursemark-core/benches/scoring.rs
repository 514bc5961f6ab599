use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use coursemark_core::evaluator::evaluate;
use coursemark_core::model::{CourseStructure, LessonContent, LessonRef, Question};
use coursemark_core::progress::{Answer, ProgressRecord};
use coursemark_core::recorder::{record_quiz_attempt, score_answers};
use uuid::Uuid;

fn make_course(lessons: usize, questions: usize) -> CourseStructure {
    CourseStructure {
        id: "bench".into(),
        title: "Bench".into(),
        description: String::new(),
        lessons: (0..lessons)
            .map(|i| LessonRef {
                id: format!("quiz-{i}"),
                title: format!("Quiz {i}"),
                duration_minutes: 15,
                content: LessonContent::Quiz {
                    questions: (0..questions)
                        .map(|q| Question {
                            prompt: format!("Question {q}"),
                            options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
                            correct_option: q % 4,
                            points: 1,
                        })
                        .collect(),
                },
            })
            .collect(),
    }
}

fn answers(questions: usize) -> Vec<Answer> {
    (0..questions).map(|q| Answer::new(q, q % 3)).collect()
}

fn bench_score_answers(c: &mut Criterion) {
    let mut group = c.benchmark_group("score_answers");

    for questions in [10, 100, 1000] {
        let course = make_course(1, questions);
        let lesson = &course.lessons[0];
        let answers = answers(questions);
        group.bench_function(format!("questions={questions}"), |b| {
            b.iter(|| score_answers(black_box(lesson), black_box(&answers)))
        });
    }

    group.finish();
}

fn bench_evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluate");

    for lessons in [4, 50, 500] {
        let course = make_course(lessons, 10);
        let mut record = ProgressRecord::new("bench", "bench", Utc::now());
        for lesson in course.lessons.iter().step_by(2) {
            // Setup only; the scored result is not measured.
            let _ = record_quiz_attempt(
                &mut record,
                &course,
                Uuid::new_v4(),
                &lesson.id,
                &answers(10),
                Utc::now(),
            );
        }
        group.bench_function(format!("lessons={lessons}"), |b| {
            b.iter(|| {
                let mut record = record.clone();
                evaluate(black_box(&mut record), black_box(&course), Utc::now())
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_score_answers, bench_evaluate);
criterion_main!(benches);
