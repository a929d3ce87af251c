use cadenza::lexer::tokenize;
use cadenza::{Runtime, parse_str};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

// A small live-coding session: theory helpers, recursion and engine calls.
const BENCH_INPUT: &str = r#"
; tempo and a pad
(bpm 96)
(def root (note :C4))
(def pad (synth :prophet {:note root :amp 0.3 :cutoff 70}))

(defn arpeggio [notes]
  ; play every note of the chord once
  (if (= (first notes) nil)
      nil
      (do (play-note (first notes))
          (arpeggio (rest notes)))))

(defn transpose [n interval] (+ n interval))

(arpeggio (chord root :maj7))
(arpeggio (chord (transpose root 5) :min7))
(arpeggio (scale :A3 :pentatonic))

(let [fifth (transpose root 7)
      freq (midi->freq fifth)]
  (print "fifth" fifth "at" freq "Hz"))

(set-param pad :cutoff 90)
(osc "/n_set" (- 0 1) "amp" 0.1)
(sleep 0.25)
(free pad)
"#;

fn bench_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("Pipeline");

    group.bench_with_input(
        BenchmarkId::new("tokenize", "session"),
        &BENCH_INPUT,
        |b, input| b.iter(|| tokenize(black_box(input))),
    );

    group.bench_with_input(
        BenchmarkId::new("parse", "session"),
        &BENCH_INPUT,
        |b, input| b.iter(|| parse_str(black_box(input))),
    );

    // A fresh runtime per iteration so definitions don't accumulate.
    group.bench_with_input(
        BenchmarkId::new("eval", "session"),
        &BENCH_INPUT,
        |b, input| {
            b.iter(|| {
                let mut runtime = Runtime::default();
                runtime.eval(black_box(input))
            })
        },
    );

    group.finish();
}

criterion_group!(benches, bench_pipeline);
criterion_main!(benches);
