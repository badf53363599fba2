//! Media pipeline benchmark suite.
//!
//! Measures the CPU side of attachment retrieval:
//! - Key derivation (HKDF-SHA256, 112 bytes)
//! - Tag stripping + AES-256-CBC decryption at several chunk sizes
//!
//! Run with: cargo bench --bench media_pipeline
//! Results saved to: target/criterion/

use std::hint::black_box;

use aes::Aes256;
use cbc::cipher::generic_array::GenericArray;
use cbc::cipher::{BlockEncryptMut, KeyIvInit};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

use whatslogged::media::{KeyBundle, MAC_TAG_LEN, StreamDecryptor, TagStripper};

// ============================================================================
// Benchmark Parameters
// ============================================================================

const MEDIA_KEY: &[u8; 32] = b"0123456789abcdef0123456789abcdef";
const PAYLOAD_BYTES: usize = 1024 * 1024;
const CHUNK_SIZES: &[usize] = &[1024, 16 * 1024, 64 * 1024];

// ============================================================================
// Fixtures
// ============================================================================

/// Ciphertext as served: padded, encrypted, followed by a tag.
fn wire(bundle: &KeyBundle, len: usize) -> Vec<u8> {
    let mut data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    let pad = 16 - len % 16;
    data.extend(std::iter::repeat_n(pad as u8, pad));

    let mut cipher = cbc::Encryptor::<Aes256>::new_from_slices(&bundle.enc_key, &bundle.iv)
        .expect("valid key and iv");
    for block in data.chunks_exact_mut(16) {
        cipher.encrypt_block_mut(GenericArray::from_mut_slice(block));
    }
    data.extend_from_slice(&[0u8; MAC_TAG_LEN]);
    data
}

fn decrypt(bundle: &KeyBundle, wire: &[u8], chunk: usize) -> Vec<u8> {
    let mut stripper = TagStripper::new(Some(wire.len() as u64));
    let mut decryptor = StreamDecryptor::new(bundle).expect("decryptor");
    let mut ciphertext = Vec::with_capacity(chunk);
    let mut plain = Vec::with_capacity(wire.len());

    for piece in wire.chunks(chunk) {
        ciphertext.clear();
        stripper.push(piece, &mut ciphertext);
        decryptor.update(&ciphertext, &mut plain);
    }
    stripper.finish().expect("complete stream");
    decryptor.finish(&mut plain).expect("valid padding");
    plain
}

// ============================================================================
// Benchmarks
// ============================================================================

fn bench_derive(c: &mut Criterion) {
    c.bench_function("key_derive", |b| {
        b.iter(|| KeyBundle::derive(black_box(MEDIA_KEY), black_box("WhatsApp Image Keys")));
    });
}

fn bench_decrypt(c: &mut Criterion) {
    let bundle = KeyBundle::derive(MEDIA_KEY, "WhatsApp Image Keys").expect("derive");
    let wire = wire(&bundle, PAYLOAD_BYTES);

    let mut group = c.benchmark_group("decrypt_stream");
    group.throughput(Throughput::Bytes(wire.len() as u64));

    for &chunk in CHUNK_SIZES {
        group.bench_with_input(BenchmarkId::new("chunk", chunk), &chunk, |b, &chunk| {
            b.iter(|| decrypt(&bundle, black_box(&wire), chunk));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_derive, bench_decrypt);
criterion_main!(benches);
