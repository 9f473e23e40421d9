//! CPU workload bodies.
//!
//! Every kind has a single-core form and a multi-core form that splits the
//! same work across scoped threads. Each workload reports an operation count
//! (what "ops" means differs per kind), a validity check on its own output,
//! and a small metrics object.

use std::f64::consts::PI;
use std::fmt::Write as _;
use std::ops::{Add, Mul, Range, Sub};
use std::thread;
use std::time::Instant;

use finbench_common::{BenchmarkResult, TestCategory, WorkloadKind};
use serde_json::{Value, json};
use tracing::debug;

use crate::params::WorkloadParams;

const MB: usize = 1024 * 1024;
const STRING_LENGTH: usize = 50;
const MEMO_REPETITIONS: u64 = 20_000;

/// Known N-Queens solution counts indexed by board size.
const NQUEENS_SOLUTIONS: [u64; 16] = [
    1, 1, 0, 0, 2, 10, 4, 40, 92, 352, 724, 2680, 14200, 73712, 365596, 2279184,
];

/// Raw output of a workload body, before timing is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub operations: f64,
    pub is_valid: bool,
    pub metrics: Value,
}

/// Worker threads used by multi-core variants.
pub fn available_threads() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Run one catalog test and time it.
///
/// A zero elapsed time yields infinite throughput, which the scoring engine
/// treats as zero.
pub fn run_test(
    kind: WorkloadKind,
    category: TestCategory,
    params: &WorkloadParams,
    threads: usize,
) -> BenchmarkResult {
    let name = kind.test_name(category);
    let threads = match category {
        TestCategory::MultiCore => threads.max(1),
        _ => 1,
    };

    let start = Instant::now();
    let measurement = measure(kind, params, threads);
    let secs = start.elapsed().as_secs_f64();

    let ops_per_second = if secs > 0.0 {
        measurement.operations / secs
    } else {
        f64::INFINITY
    };

    debug!(
        test = %name,
        threads,
        duration_ms = format!("{:.1}", secs * 1000.0),
        ops_per_second,
        valid = measurement.is_valid,
        "Workload finished"
    );

    BenchmarkResult {
        name,
        execution_time_ms: secs * 1000.0,
        ops_per_second,
        is_valid: measurement.is_valid,
        metrics_json: measurement.metrics.to_string(),
    }
}

/// Execute a workload body with `threads` workers (1 for single-core).
pub fn measure(kind: WorkloadKind, params: &WorkloadParams, threads: usize) -> Measurement {
    match kind {
        WorkloadKind::PrimeGeneration => prime_generation(params.prime_range, threads),
        WorkloadKind::Fibonacci if threads > 1 => {
            fibonacci_memoized(params.fibonacci_range, threads)
        }
        WorkloadKind::Fibonacci => fibonacci_recursive_range(params.fibonacci_range),
        WorkloadKind::MatrixMultiplication => matrix_multiplication(params.matrix_size, threads),
        WorkloadKind::HashComputing => hash_computing(params.hash_data_mb * MB, threads),
        WorkloadKind::StringSorting => string_sorting(params.string_count, threads),
        WorkloadKind::RayTracing => ray_tracing(params.ray_resolution, params.ray_depth, threads),
        WorkloadKind::Compression => compression(params.compression_data_mb * MB, threads),
        WorkloadKind::MonteCarloPi => monte_carlo_pi(params.monte_carlo_samples, threads),
        WorkloadKind::JsonParsing => json_parsing(params.json_data_mb * MB, threads),
        WorkloadKind::NQueens => nqueens(params.nqueens_size, threads),
    }
}

/// Run `f(worker_index)` on `threads` scoped threads, results in index order.
///
/// A panicking worker re-raises its panic on the calling thread.
fn parallel<T, F>(threads: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Sync,
{
    let threads = threads.max(1);
    if threads == 1 {
        return vec![f(0)];
    }
    thread::scope(|scope| {
        let handles: Vec<_> = (0..threads)
            .map(|index| {
                let f = &f;
                scope.spawn(move || f(index))
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
            })
            .collect()
    })
}

/// The `index`-th of `parts` near-equal slices of `0..total`.
fn chunk(total: usize, parts: usize, index: usize) -> Range<usize> {
    let parts = parts.max(1);
    let base = total / parts;
    let extra = total % parts;
    let start = index * base + index.min(extra);
    let len = base + usize::from(index < extra);
    start..start + len
}

// Prime sieve

/// Count primes `<= limit` with the Sieve of Eratosthenes.
pub fn prime_sieve(limit: usize) -> u64 {
    if limit < 2 {
        return 0;
    }
    let mut is_prime = vec![true; limit + 1];
    is_prime[0] = false;
    is_prime[1] = false;

    let mut p = 2;
    while p * p <= limit {
        if is_prime[p] {
            for multiple in (p * p..=limit).step_by(p) {
                is_prime[multiple] = false;
            }
        }
        p += 1;
    }
    is_prime.iter().filter(|&&flag| flag).count() as u64
}

fn base_primes(limit: usize) -> Vec<usize> {
    let root = limit.isqrt();
    let mut is_prime = vec![true; root + 1];
    let mut primes = Vec::new();
    for n in 2..=root {
        if is_prime[n] {
            primes.push(n);
            for multiple in (n * n..=root).step_by(n) {
                is_prime[multiple] = false;
            }
        }
    }
    primes
}

/// Count primes in `range` given every prime up to `sqrt(range.end)`.
fn count_primes_segment(range: Range<usize>, base: &[usize]) -> u64 {
    if range.is_empty() {
        return 0;
    }
    let mut is_prime = vec![true; range.len()];
    for &p in base {
        if p * p >= range.end {
            break;
        }
        let mut multiple = (range.start.div_ceil(p) * p).max(p * p);
        while multiple < range.end {
            is_prime[multiple - range.start] = false;
            multiple += p;
        }
    }
    is_prime
        .iter()
        .enumerate()
        .filter(|(offset, flag)| **flag && range.start + offset >= 2)
        .count() as u64
}

fn prime_generation(limit: usize, threads: usize) -> Measurement {
    let count = if threads > 1 {
        let base = base_primes(limit);
        let total = limit + 1;
        parallel(threads, |index| {
            count_primes_segment(chunk(total, threads, index), &base)
        })
        .into_iter()
        .sum()
    } else {
        prime_sieve(limit)
    };

    let n = limit as f64;
    Measurement {
        operations: (n * n.ln().ln()).max(0.0),
        is_valid: count > 0,
        metrics: json!({ "prime_count": count, "range": limit, "threads": threads }),
    }
}

// Fibonacci

pub fn fibonacci_recursive(n: u32) -> u64 {
    if n <= 1 {
        return n as u64;
    }
    fibonacci_recursive(n - 1) + fibonacci_recursive(n - 2)
}

fn fibonacci_memo(n: u32, memo: &mut [Option<u64>]) -> u64 {
    if n <= 1 {
        return n as u64;
    }
    if let Some(value) = memo[n as usize] {
        return value;
    }
    let value = fibonacci_memo(n - 1, memo) + fibonacci_memo(n - 2, memo);
    memo[n as usize] = Some(value);
    value
}

fn fibonacci_recursive_range((start, end): (u32, u32)) -> Measurement {
    let values: Vec<u64> = (start..=end).map(fibonacci_recursive).collect();
    Measurement {
        operations: values.len() as f64,
        is_valid: !values.is_empty(),
        metrics: json!({ "fibonacci_results": values, "range": [start, end] }),
    }
}

/// Memoized Fibonacci, repeated with a fresh table so the work is measurable.
fn fibonacci_memoized((start, end): (u32, u32), threads: usize) -> Measurement {
    let indices: Vec<u32> = (start..=end).collect();
    let per_worker = parallel(threads, |index| {
        let mut computed = Vec::new();
        for &n in indices.iter().skip(index).step_by(threads) {
            let mut last = 0;
            for _ in 0..MEMO_REPETITIONS {
                let mut memo = vec![None; n as usize + 1];
                last = fibonacci_memo(n, &mut memo);
            }
            computed.push((n, last));
        }
        computed
    });

    let mut values: Vec<(u32, u64)> = per_worker.into_iter().flatten().collect();
    values.sort_unstable_by_key(|(n, _)| *n);
    let is_valid = values
        .iter()
        .all(|&(n, value)| n > 30 || value == fibonacci_recursive(n));

    Measurement {
        operations: (values.len() as u64 * MEMO_REPETITIONS) as f64,
        is_valid: is_valid && !values.is_empty(),
        metrics: json!({
            "fibonacci_results": values.iter().map(|(_, v)| *v).collect::<Vec<_>>(),
            "range": [start, end],
            "repetitions": MEMO_REPETITIONS,
        }),
    }
}

// Matrix multiplication

fn build_matrix(size: usize) -> Vec<f64> {
    (0..size * size)
        .map(|cell| {
            let (i, j) = (cell / size, cell % size);
            ((i * j) % 7) as f64 / 7.0 + 0.5
        })
        .collect()
}

/// Rows `rows` of `a × b` for row-major square matrices.
fn multiply_rows(a: &[f64], b: &[f64], size: usize, rows: Range<usize>) -> Vec<f64> {
    let mut out = vec![0.0; rows.len() * size];
    for (local, i) in rows.enumerate() {
        let out_row = &mut out[local * size..(local + 1) * size];
        for k in 0..size {
            let a_ik = a[i * size + k];
            let b_row = &b[k * size..(k + 1) * size];
            for (cell, b_kj) in out_row.iter_mut().zip(b_row) {
                *cell += a_ik * b_kj;
            }
        }
    }
    out
}

fn matrix_multiplication(size: usize, threads: usize) -> Measurement {
    let a = build_matrix(size);
    let b = build_matrix(size);
    let blocks = parallel(threads, |index| {
        multiply_rows(&a, &b, size, chunk(size, threads, index))
    });
    let checksum: f64 = blocks.iter().flatten().sum();

    Measurement {
        operations: 2.0 * (size as f64).powi(3),
        is_valid: size > 0 && checksum.is_finite(),
        metrics: json!({ "matrix_size": size, "checksum": checksum, "threads": threads }),
    }
}

// Hashing

fn random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut data = vec![0u8; len];
    fastrand::Rng::with_seed(seed).fill(&mut data);
    data
}

fn hash_computing(bytes: usize, threads: usize) -> Measurement {
    let data = random_bytes(bytes, 0x5eed);
    let digest = if threads > 1 {
        let digests = parallel(threads, |index| {
            blake3::hash(&data[chunk(data.len(), threads, index)])
        });
        let mut hasher = blake3::Hasher::new();
        for digest in &digests {
            hasher.update(digest.as_bytes());
        }
        hasher.finalize()
    } else {
        blake3::hash(&data)
    };

    Measurement {
        operations: data.len() as f64,
        is_valid: !data.is_empty() && digest.as_bytes().iter().any(|&b| b != 0),
        metrics: json!({
            "data_size_mb": bytes / MB,
            "digest": digest.to_hex().to_string(),
            "threads": threads,
        }),
    }
}

// String sorting

fn random_strings(count: usize, seed: u64) -> Vec<String> {
    let mut rng = fastrand::Rng::with_seed(seed);
    (0..count)
        .map(|_| (0..STRING_LENGTH).map(|_| rng.alphanumeric()).collect())
        .collect()
}

fn string_sorting(count: usize, threads: usize) -> Measurement {
    let mut strings = random_strings(count, 0x5eed);
    if threads > 1 {
        let chunk_len = count.div_ceil(threads).max(1);
        thread::scope(|scope| {
            for slice in strings.chunks_mut(chunk_len) {
                scope.spawn(move || slice.sort_unstable());
            }
        });
    }
    // The stable sort merges presorted runs left by the workers.
    strings.sort();

    let n = count as f64;
    Measurement {
        operations: if count > 1 { n * n.ln() } else { n },
        is_valid: strings.len() == count && strings.is_sorted(),
        metrics: json!({ "string_count": count, "string_length": STRING_LENGTH, "threads": threads }),
    }
}

// Ray tracing

#[derive(Debug, Clone, Copy, PartialEq)]
struct Vec3 {
    x: f64,
    y: f64,
    z: f64,
}

impl Vec3 {
    const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    fn dot(self, other: Vec3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    fn normalize(self) -> Vec3 {
        let len = self.dot(self).sqrt();
        if len > 0.0 { self * (1.0 / len) } else { self }
    }

    fn luminance(self) -> f64 {
        0.2126 * self.x + 0.7152 * self.y + 0.0722 * self.z
    }
}

impl Add for Vec3 {
    type Output = Vec3;
    fn add(self, o: Vec3) -> Vec3 {
        Vec3::new(self.x + o.x, self.y + o.y, self.z + o.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;
    fn sub(self, o: Vec3) -> Vec3 {
        Vec3::new(self.x - o.x, self.y - o.y, self.z - o.z)
    }
}

impl Mul<f64> for Vec3 {
    type Output = Vec3;
    fn mul(self, s: f64) -> Vec3 {
        Vec3::new(self.x * s, self.y * s, self.z * s)
    }
}

struct Sphere {
    center: Vec3,
    radius: f64,
    color: Vec3,
    reflectivity: f64,
}

impl Sphere {
    /// Nearest positive hit distance along a normalized ray.
    fn intersect(&self, origin: Vec3, dir: Vec3) -> Option<f64> {
        let oc = origin - self.center;
        let b = oc.dot(dir);
        let c = oc.dot(oc) - self.radius * self.radius;
        let disc = b * b - c;
        if disc < 0.0 {
            return None;
        }
        let root = disc.sqrt();
        [-b - root, -b + root].into_iter().find(|&t| t > 1e-6)
    }
}

static SCENE: [Sphere; 4] = [
    Sphere {
        center: Vec3::new(0.0, -1001.0, 3.0),
        radius: 1000.0,
        color: Vec3::new(0.6, 0.6, 0.6),
        reflectivity: 0.2,
    },
    Sphere {
        center: Vec3::new(0.0, 0.0, 3.0),
        radius: 1.0,
        color: Vec3::new(0.9, 0.2, 0.2),
        reflectivity: 0.5,
    },
    Sphere {
        center: Vec3::new(-2.0, 0.0, 4.0),
        radius: 1.0,
        color: Vec3::new(0.2, 0.9, 0.2),
        reflectivity: 0.3,
    },
    Sphere {
        center: Vec3::new(2.0, 0.0, 4.0),
        radius: 1.0,
        color: Vec3::new(0.2, 0.2, 0.9),
        reflectivity: 0.7,
    },
];

fn sky(dir: Vec3) -> Vec3 {
    let t = 0.5 * (dir.y + 1.0);
    Vec3::new(1.0, 1.0, 1.0) * (1.0 - t) + Vec3::new(0.5, 0.7, 1.0) * t
}

fn trace(origin: Vec3, dir: Vec3, depth: u32) -> Vec3 {
    let hit = SCENE
        .iter()
        .filter_map(|sphere| sphere.intersect(origin, dir).map(|t| (t, sphere)))
        .min_by(|a, b| a.0.total_cmp(&b.0));
    let Some((t, sphere)) = hit else {
        return sky(dir);
    };

    let point = origin + dir * t;
    let normal = (point - sphere.center).normalize();
    let light = Vec3::new(-0.5, 1.0, -0.3).normalize();
    let base = sphere.color * (0.1 + 0.9 * normal.dot(light).max(0.0));
    if depth == 0 || sphere.reflectivity <= 0.0 {
        return base;
    }

    let reflected = (dir - normal * (2.0 * dir.dot(normal))).normalize();
    let bounce = trace(point + normal * 1e-4, reflected, depth - 1);
    base * (1.0 - sphere.reflectivity) + bounce * sphere.reflectivity
}

/// Sum of pixel luminance over `rows`.
fn render_rows(width: usize, height: usize, depth: u32, rows: Range<usize>) -> f64 {
    let aspect = width as f64 / height as f64;
    let origin = Vec3::new(0.0, 0.0, -1.0);
    let mut total = 0.0;
    for y in rows {
        for x in 0..width {
            let u = ((x as f64 + 0.5) / width as f64 * 2.0 - 1.0) * aspect;
            let v = 1.0 - (y as f64 + 0.5) / height as f64 * 2.0;
            let dir = Vec3::new(u, v, 1.5).normalize();
            total += trace(origin, dir, depth).luminance();
        }
    }
    total
}

fn ray_tracing((width, height): (usize, usize), depth: u32, threads: usize) -> Measurement {
    let luminance: f64 = parallel(threads, |index| {
        render_rows(width, height, depth, chunk(height, threads, index))
    })
    .into_iter()
    .sum();

    let rays = (width * height) as f64;
    Measurement {
        operations: rays,
        is_valid: rays > 0.0 && luminance.is_finite() && luminance > 0.0,
        metrics: json!({
            "resolution": [width, height],
            "max_depth": depth,
            "ray_count": rays,
            "luminance_checksum": luminance,
        }),
    }
}

// Compression

/// Pseudo-random bytes with runs so RLE has something to compress.
fn runny_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = fastrand::Rng::with_seed(seed);
    let mut data = Vec::with_capacity(len);
    while data.len() < len {
        let value = rng.u8(..);
        let run = rng.usize(1..=16).min(len - data.len());
        data.extend(std::iter::repeat_n(value, run));
    }
    data
}

/// Run-length encode as `(count, value)` pairs, counts capped at 255.
pub fn rle_compress(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut iter = data.iter().copied().peekable();
    while let Some(value) = iter.next() {
        let mut count: u8 = 1;
        while count < u8::MAX && iter.peek() == Some(&value) {
            iter.next();
            count += 1;
        }
        out.push(count);
        out.push(value);
    }
    out
}

pub fn rle_decompress(encoded: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    for pair in encoded.chunks_exact(2) {
        out.extend(std::iter::repeat_n(pair[1], pair[0] as usize));
    }
    out
}

fn compression(bytes: usize, threads: usize) -> Measurement {
    let data = runny_bytes(bytes, 0x5eed);
    let outcomes = parallel(threads, |index| {
        let slice = &data[chunk(data.len(), threads, index)];
        let compressed = rle_compress(slice);
        let roundtrip = rle_decompress(&compressed) == slice;
        (compressed.len(), roundtrip)
    });

    let compressed_size: usize = outcomes.iter().map(|(len, _)| len).sum();
    let roundtrip = outcomes.iter().all(|(_, ok)| *ok);
    let ratio = if compressed_size > 0 {
        data.len() as f64 / compressed_size as f64
    } else {
        0.0
    };

    Measurement {
        operations: data.len() as f64,
        is_valid: !data.is_empty() && roundtrip,
        metrics: json!({
            "original_size": data.len(),
            "compressed_size": compressed_size,
            "compression_ratio": ratio,
        }),
    }
}

// Monte Carlo

fn monte_carlo_pi(samples: u64, threads: usize) -> Measurement {
    let per_worker = samples / threads.max(1) as u64;
    let remainder = samples % threads.max(1) as u64;
    let inside: u64 = parallel(threads, |index| {
        let mut rng = fastrand::Rng::with_seed(0x5eed + index as u64);
        let n = per_worker + u64::from((index as u64) < remainder);
        let mut hits = 0u64;
        for _ in 0..n {
            let (x, y) = (rng.f64(), rng.f64());
            if x * x + y * y <= 1.0 {
                hits += 1;
            }
        }
        hits
    })
    .into_iter()
    .sum();

    let estimate = if samples > 0 {
        4.0 * inside as f64 / samples as f64
    } else {
        0.0
    };

    Measurement {
        operations: samples as f64,
        is_valid: samples > 0 && (estimate - PI).abs() < 0.2,
        metrics: json!({
            "samples": samples,
            "pi_estimate": estimate,
            "error": (estimate - PI).abs(),
        }),
    }
}

// JSON parsing

fn generate_json(target_bytes: usize, seed: u64) -> String {
    let mut rng = fastrand::Rng::with_seed(seed);
    let mut doc = String::from("{\"data\":[");
    let mut id = 0u64;
    while doc.len() < target_bytes {
        if id > 0 {
            doc.push(',');
        }
        let _ = write!(
            doc,
            "{{\"id\":{id},\"name\":\"item{id}\",\"active\":{},\"score\":{:.3},\
             \"tags\":[\"alpha\",\"beta\",\"gamma\"],\
             \"nested\":{{\"value\":{},\"array\":[1,2,3,4,5]}}}}",
            rng.bool(),
            rng.f64() * 100.0,
            rng.u32(..),
        );
        id += 1;
    }
    doc.push_str("]}");
    doc
}

fn count_elements(value: &Value) -> u64 {
    match value {
        Value::Object(map) => 1 + map.values().map(count_elements).sum::<u64>(),
        Value::Array(items) => 1 + items.iter().map(count_elements).sum::<u64>(),
        _ => 1,
    }
}

fn json_parsing(bytes: usize, threads: usize) -> Measurement {
    let outcomes = parallel(threads, |index| {
        let doc = generate_json(chunk(bytes, threads, index).len(), 0x5eed + index as u64);
        match serde_json::from_str::<Value>(&doc) {
            Ok(parsed) => Some((doc.len(), count_elements(&parsed))),
            Err(_) => None,
        }
    });

    let parsed: Vec<(usize, u64)> = outcomes.iter().flatten().copied().collect();
    let elements: u64 = parsed.iter().map(|(_, n)| n).sum();
    let json_size: usize = parsed.iter().map(|(len, _)| len).sum();

    Measurement {
        operations: elements as f64,
        is_valid: parsed.len() == outcomes.len() && elements > 0,
        metrics: json!({ "json_size": json_size, "elements_parsed": elements, "threads": threads }),
    }
}

// N-Queens

fn place_queens(all: u32, cols: u32, left: u32, right: u32) -> u64 {
    if cols == all {
        return 1;
    }
    let mut open = all & !(cols | left | right);
    let mut solutions = 0;
    while open != 0 {
        let bit = open & open.wrapping_neg();
        open ^= bit;
        solutions += place_queens(all, cols | bit, ((left | bit) << 1) & all, (right | bit) >> 1);
    }
    solutions
}

/// Count N-Queens solutions, first-row columns split across workers.
pub fn count_nqueens(n: usize, threads: usize) -> u64 {
    if n == 0 || n > 31 {
        return 0;
    }
    let all = (1u32 << n) - 1;
    parallel(threads, |index| {
        (0..n)
            .skip(index)
            .step_by(threads.max(1))
            .map(|col| {
                let bit = 1u32 << col;
                place_queens(all, bit, (bit << 1) & all, bit >> 1)
            })
            .sum::<u64>()
    })
    .into_iter()
    .sum()
}

fn nqueens(n: usize, threads: usize) -> Measurement {
    let solutions = count_nqueens(n, threads);
    let expected = NQUEENS_SOLUTIONS.get(n).copied();

    Measurement {
        operations: solutions as f64,
        is_valid: solutions > 0 && expected.is_none_or(|known| known == solutions),
        metrics: json!({ "board_size": n, "solutions": solutions, "threads": threads }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use finbench_common::Preset;

    fn tiny() -> WorkloadParams {
        WorkloadParams::for_preset(Preset::Mid).scaled(1000)
    }

    #[test]
    fn test_chunk_covers_range() {
        let parts: Vec<_> = (0..3).map(|i| chunk(10, 3, i)).collect();
        assert_eq!(parts, vec![0..4, 4..7, 7..10]);
        assert_eq!(chunk(2, 4, 3), 2..2);
    }

    #[test]
    fn test_prime_sieve_counts() {
        assert_eq!(prime_sieve(1), 0);
        assert_eq!(prime_sieve(10), 4);
        assert_eq!(prime_sieve(100), 25);
        assert_eq!(prime_sieve(10_000), 1229);
    }

    #[test]
    fn test_segmented_sieve_matches_single() {
        for threads in [2, 3, 7] {
            let m = prime_generation(10_000, threads);
            assert_eq!(m.metrics["prime_count"], 1229, "threads={threads}");
        }
    }

    #[test]
    fn test_fibonacci_variants_agree() {
        assert_eq!(fibonacci_recursive(20), 6765);
        let mut memo = vec![None; 41];
        assert_eq!(fibonacci_memo(40, &mut memo), 102_334_155);

        let m = fibonacci_memoized((10, 14), 2);
        assert!(m.is_valid);
        assert_eq!(m.metrics["fibonacci_results"], json!([55, 89, 144, 233, 377]));
    }

    #[test]
    fn test_matrix_checksum_independent_of_threads() {
        let single = matrix_multiplication(17, 1);
        let multi = matrix_multiplication(17, 4);
        assert!(single.is_valid);
        assert_eq!(single.metrics["checksum"], multi.metrics["checksum"]);
        assert_eq!(single.operations, 2.0 * 17f64.powi(3));
    }

    #[test]
    fn test_rle_roundtrip_and_long_runs() {
        let data = [vec![7u8; 600], vec![1, 2, 2, 3]].concat();
        let encoded = rle_compress(&data);
        assert_eq!(&encoded[..6], &[255, 7, 255, 7, 90, 7]);
        assert_eq!(rle_decompress(&encoded), data);
        assert!(rle_compress(&[]).is_empty());
    }

    #[test]
    fn test_nqueens_known_counts() {
        assert_eq!(count_nqueens(4, 1), 2);
        assert_eq!(count_nqueens(8, 1), 92);
        assert_eq!(count_nqueens(8, 3), 92);
        assert_eq!(count_nqueens(0, 1), 0);
    }

    #[test]
    fn test_every_workload_valid_on_tiny_params() {
        let params = tiny();
        for kind in WorkloadKind::ALL {
            for category in [TestCategory::SingleCore, TestCategory::MultiCore] {
                let result = run_test(kind, category, &params, 2);
                assert!(result.is_valid, "{} should be valid", result.name);
                assert_eq!(result.name, kind.test_name(category));
                let metrics: Value = serde_json::from_str(&result.metrics_json).unwrap();
                assert!(metrics.is_object());
            }
        }
    }
}
