//! # Jukebox Performance Benchmarks
//!
//! - **Name codec**: key encoding and file-name parsing
//! - **Transforms**: compression, encryption and digests of song-sized blobs
//! - **Catalog**: inserts and filtered song queries
//! - **Shuffle**: seeded shuffles of large play lists
//!
//! ```bash
//! cargo bench
//! cargo bench transforms
//! ```

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use jukebox::cache::md5_hex;
use jukebox::controller::shuffle_songs;
use jukebox::db::Catalog;
use jukebox::name_codec::{self, components_from_file_name, ContainerNames};
use jukebox::song::Song;
use jukebox::transform::Pipeline;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::hint::black_box;
use tempfile::TempDir;

const ARTISTS: [&str; 5] = ["The Who", "ABBA", "Queen", "A Tribe Called Quest", "Beck"];

fn create_test_songs(count: usize) -> Vec<Song> {
    let names = ContainerNames::new("bench.");
    (0..count)
        .map(|i| {
            let artist = ARTISTS[i % ARTISTS.len()];
            let album = format!("Album {}", i / 10);
            let song = format!("Song {i}");
            let song_uid = format!("{}.mp3", name_codec::song_key(artist, &album, &song));
            Song {
                container_name: names.container_for_song(&song_uid).unwrap_or_default(),
                object_name: song_uid.clone(),
                album_uid: Some(name_codec::album_key(artist, &album)),
                song_uid,
                artist_name: artist.to_string(),
                song_name: song,
                origin_size: 4_000_000,
                stored_size: 4_000_000,
                md5_hash: "0f343b0931126a20f133d67c2b018a3b".to_string(),
                ..Song::default()
            }
        })
        .collect()
}

fn create_benchmark_catalog(count: usize) -> (TempDir, Catalog) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let mut catalog =
        Catalog::open(&temp_dir.path().join("bench.sqlite3")).expect("Failed to open catalog");
    for song in create_test_songs(count) {
        catalog.insert_song(&song).expect("Failed to insert song");
    }
    (temp_dir, catalog)
}

fn random_blob(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    StdRng::seed_from_u64(7).fill_bytes(&mut bytes);
    bytes
}

fn benchmark_name_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("name_codec");
    let names = ContainerNames::new("bench.");

    group.bench_function("song_key", |b| {
        b.iter(|| name_codec::song_key(black_box("The Who"), black_box("Who's Next"), black_box("Baba O'Riley")))
    });

    group.bench_function("components_from_file_name", |b| {
        b.iter(|| components_from_file_name(black_box("The-Who--Whos-Next--Baba-ORiley.mp3")))
    });

    group.bench_function("container_for_song", |b| {
        b.iter(|| names.container_for_song(black_box("The-Who--Whos-Next--My-Wife.mp3")))
    });

    group.finish();
}

fn benchmark_transforms(c: &mut Criterion) {
    let mut group = c.benchmark_group("transforms");
    let blob = random_blob(1 << 20);

    group.bench_function("md5_1mib", |b| b.iter(|| md5_hex(black_box(&blob))));

    for (label, pipeline) in [
        ("compress", Pipeline::new(true, None)),
        ("encrypt", Pipeline::new(false, Some("bench key"))),
        ("compress_encrypt", Pipeline::new(true, Some("bench key"))),
    ] {
        group.bench_with_input(BenchmarkId::new("encode_1mib", label), &pipeline, |b, p| {
            b.iter(|| p.encode(black_box(&blob)).expect("encode"))
        });

        let stored = pipeline.encode(&blob).expect("encode");
        group.bench_with_input(BenchmarkId::new("decode_1mib", label), &pipeline, |b, p| {
            b.iter(|| p.decode(black_box(&stored)).expect("decode"))
        });
    }

    group.finish();
}

fn benchmark_catalog(c: &mut Criterion) {
    let mut group = c.benchmark_group("catalog");

    group.bench_function("insert_100_songs", |b| {
        b.iter_batched(
            || {
                let temp_dir = TempDir::new().expect("Failed to create temp directory");
                let catalog = Catalog::open(&temp_dir.path().join("bench.sqlite3"))
                    .expect("Failed to open catalog");
                (temp_dir, catalog, create_test_songs(100))
            },
            |(_temp_dir, mut catalog, songs)| {
                for song in &songs {
                    catalog.insert_song(song).expect("Failed to insert song");
                }
            },
            BatchSize::PerIteration,
        )
    });

    let (_temp_dir, catalog) = create_benchmark_catalog(2000);

    group.bench_function("retrieve_all", |b| {
        b.iter(|| catalog.retrieve_songs(None, None).expect("query"))
    });

    group.bench_function("retrieve_by_artist", |b| {
        b.iter(|| catalog.retrieve_songs(black_box(Some("Queen")), None).expect("query"))
    });

    group.bench_function("retrieve_by_album", |b| {
        b.iter(|| {
            catalog
                .retrieve_songs(black_box(Some("ABBA")), black_box(Some("Album 3")))
                .expect("query")
        })
    });

    group.bench_function("find_song_by_key", |b| {
        b.iter(|| catalog.find_song_by_key(black_box("Beck--Album-0--Song-4")).expect("query"))
    });

    group.finish();
}

fn benchmark_shuffle(c: &mut Criterion) {
    let mut group = c.benchmark_group("shuffle");

    for size in [100, 1000, 10_000] {
        let songs = create_test_songs(size);
        group.bench_with_input(BenchmarkId::new("seeded", size), &songs, |b, songs| {
            b.iter_batched(
                || songs.clone(),
                |mut songs| shuffle_songs(&mut songs, Some(42)),
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_name_codec,
    benchmark_transforms,
    benchmark_catalog,
    benchmark_shuffle
);

criterion_main!(benches);
