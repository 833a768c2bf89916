use bmtree::hash::hash;
use bmtree::{BinaryTree, MerkleTree};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use sha2::Sha256;

const MERKLE_LEAVES: u64 = 100_000;
const BST_SIZE: u64 = 100_000;
const BUILD_SIZES: [u64; 3] = [1_000, 10_000, 100_000];

fn scrambled(count: u64) -> impl Iterator<Item = u64> {
    let mut state = 0x9E37_79B9_7F4A_7C15u64;
    (0..count).map(move |_| {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        state
    })
}

fn build_merkle(size: u64) -> MerkleTree<Sha256> {
    MerkleTree::from_data((0..size).map(u64::to_be_bytes)).expect("non-empty input")
}

fn build_bst(size: u64) -> BinaryTree<u64> {
    let mut tree = BinaryTree::new();
    for key in scrambled(size) {
        let _ = tree.insert(key);
    }
    tree
}

fn merkle_benches(c: &mut Criterion) {
    let mut group = c.benchmark_group("merkle_ops");
    let tree = build_merkle(MERKLE_LEAVES);
    let target = (MERKLE_LEAVES / 2) as usize;
    let leaf = hash::<Sha256>(&(target as u64).to_be_bytes());
    let proof = tree.generate_proof(target).expect("index in range");
    let root = tree.root_hash();

    group.bench_function("generate_proof", |b| {
        b.iter(|| black_box(tree.generate_proof(black_box(target))));
    });

    group.bench_function("verify_proof", |b| {
        b.iter(|| black_box(proof.verify(&leaf, &root)));
    });

    group.bench_function("root_hash", |b| {
        b.iter(|| black_box(tree.root_hash()));
    });

    group.bench_function("export", |b| {
        b.iter(|| black_box(tree.export()));
    });

    group.finish();
}

fn merkle_build_benches(c: &mut Criterion) {
    let mut group = c.benchmark_group("merkle_build");
    for size in BUILD_SIZES {
        group.bench_with_input(BenchmarkId::new("from_data", size), &size, |b, &size| {
            b.iter(|| black_box(build_merkle(size)));
        });
    }
    group.finish();
}

fn bst_benches(c: &mut Criterion) {
    let mut group = c.benchmark_group("bst_ops");
    let mut tree = build_bst(BST_SIZE);
    let present = scrambled(BST_SIZE / 2).last().expect("non-empty");

    group.bench_function("find_hit", |b| {
        b.iter(|| black_box(tree.find(&present).is_ok()));
    });

    group.bench_function("remove_insert", |b| {
        b.iter(|| {
            black_box(tree.remove(&present)).ok();
            tree.insert(present).ok();
        });
    });

    group.bench_function("balance", |b| {
        let mut unbalanced = BinaryTree::<u64>::new();
        for key in 0..10_000 {
            let _ = unbalanced.insert(key);
        }
        b.iter(|| {
            let mut copy = unbalanced.clone();
            copy.balance();
            black_box(copy.height());
        });
    });

    group.finish();
}

criterion_group!(benches, merkle_benches, merkle_build_benches, bst_benches);
criterion_main!(benches);
