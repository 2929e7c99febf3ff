use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use lanes_core::Engine;
use lanes_core::model::{ItemKey, OrderedItem, Partition, StageId, StageSettings, TaskId, UserId};
use lanes_core::position::{Position, PositionAllocator};
use lanes_core::service::TaskDraft;
use lanes_core::store::MemoryStore;

const LANE_SIZES: [usize; 3] = [10, 100, 1_000];

fn lane(len: usize) -> Vec<OrderedItem> {
    (1_i64..)
        .take(len)
        .map(|n| OrderedItem {
            key: ItemKey::Task(TaskId::new(n)),
            partition: Partition::Stage(StageId::new(1)),
            position: Position::nth(n),
            archived_at_us: None,
            updated_at_us: 0,
            revision: 0,
        })
        .collect()
}

/// Lane whose head has no room left, so every head insert renumbers.
fn crowded(len: usize) -> Vec<OrderedItem> {
    let mut items = lane(len);
    for (item, raw) in items.iter_mut().zip(1_i64..) {
        item.position = Position::from_raw(raw);
    }
    items
}

fn bench_allocate(c: &mut Criterion) {
    let allocator = PositionAllocator::default();
    let mut group = c.benchmark_group("allocator.allocate");

    for len in LANE_SIZES {
        let roomy = lane(len);
        let tight = crowded(len);
        group.throughput(Throughput::Elements(len as u64));

        group.bench_with_input(BenchmarkId::new("head", len), &roomy, |b, siblings| {
            b.iter(|| black_box(allocator.allocate(siblings, None, 1)));
        });
        group.bench_with_input(BenchmarkId::new("middle", len), &roomy, |b, siblings| {
            b.iter(|| black_box(allocator.allocate(siblings, None, siblings.len() / 2)));
        });
        group.bench_with_input(BenchmarkId::new("append", len), &roomy, |b, siblings| {
            b.iter(|| black_box(allocator.append(siblings)));
        });
        group.bench_with_input(BenchmarkId::new("renumber", len), &tight, |b, siblings| {
            b.iter(|| black_box(allocator.allocate(siblings, None, 1)));
        });
    }

    group.finish();
}

fn bench_engine_moves(c: &mut Criterion) {
    let actor = UserId::new(1);
    let mut group = c.benchmark_group("engine.move_item");

    for len in [10_usize, 100] {
        let engine = Engine::new(MemoryStore::new());
        let boards = engine.boards();
        let board = boards.create_board(actor, "bench", None).expect("board");
        let stage = boards
            .create_stage(actor, board.id, "lane", StageSettings::default())
            .expect("stage");
        let ids: Vec<TaskId> = (0..len)
            .map(|n| {
                boards
                    .create_task(actor, stage.id, &TaskDraft::titled(format!("t{n}")))
                    .expect("task")
                    .id
            })
            .collect();
        let target = Partition::Stage(stage.id);

        group.bench_function(BenchmarkId::new("rotate", len), |b| {
            let mut step = 0_usize;
            b.iter(|| {
                let id = ids[step % ids.len()];
                step += 1;
                black_box(
                    engine
                        .reorder()
                        .move_item(actor, ItemKey::Task(id), target, step % (len + 1))
                        .expect("move"),
                )
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_allocate, bench_engine_moves);
criterion_main!(benches);
