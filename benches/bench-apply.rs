//! Benchmarks for the recursive operator kernel.
use ddcore::manager::Manager;

fn main() {
    divan::main();
}

fn adder_chain(m: &mut Manager, n_bits: u32) -> ddcore::nid::Nid {
    let mut carry = m.read_zero();
    let mut sum_bits = Vec::with_capacity(n_bits as usize);
    for i in 0..n_bits {
        let a = m.ith_var(i * 2).unwrap();
        let b = m.ith_var(i * 2 + 1).unwrap();
        let a_xor_b = m.xor(a, b).unwrap();
        let sum = m.xor(a_xor_b, carry).unwrap();
        let a_and_b = m.and(a, b).unwrap();
        let carry_and_sum = m.and(a_xor_b, carry).unwrap();
        carry = m.or(a_and_b, carry_and_sum).unwrap();
        sum_bits.push(sum);
    }
    sum_bits.into_iter().fold(m.read_one(), |acc, bit| m.and(acc, bit).unwrap())
}

#[divan::bench(args = [4, 8, 12])]
fn ripple_carry_adder(bencher: divan::Bencher, n_bits: u32) {
    bencher.bench(|| {
        let mut m = Manager::init(n_bits * 2, 0, 1 << 10, 1 << 12, u64::MAX);
        adder_chain(&mut m, n_bits)
    });
}

#[divan::bench]
fn ite_chain() {
    let mut m = Manager::init(8, 0, 1 << 10, 1 << 12, u64::MAX);
    let vars: Vec<_> = (0..8).map(|i| m.ith_var(i).unwrap()).collect();
    let mut acc = m.read_zero();
    for i in 0..7 {
        acc = m.ite(vars[i], vars[i + 1], acc).unwrap();
    }
}

#[divan::bench]
fn reduce_heap_sift_on_adder() {
    let mut m = Manager::init(8, 0, 1 << 10, 1 << 12, u64::MAX);
    adder_chain(&mut m, 4);
    m.reduce_heap(ddcore::reorder::ReorderMethod::SiftConverge, 0.0).unwrap();
}
