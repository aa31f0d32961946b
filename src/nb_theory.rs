use crate::error::{Error, Result};
use num_bigint_dig::{prime::probably_prime, BigUint};

/// Generates distinct NTT friendly primes, one for each entry in `sizes`.
///
/// Primes already present in `skip_list` are never returned, so the same
/// function generates both the Q and the P chain.
pub fn generate_primes_vec(
    sizes: &[usize],
    polynomial_degree: usize,
    skip_list: &[u64],
) -> Result<Vec<u64>> {
    let mut primes = vec![];
    for s in sizes.iter() {
        if *s < 10 || *s > 61 {
            return Err(Error::InvalidParameter(format!(
                "prime size {s} bits is outside [10, 61]"
            )));
        }

        let mut upper_bound = 1u64 << s;
        loop {
            match generate_prime(*s, (2 * polynomial_degree) as u64, upper_bound) {
                Some(p) => {
                    if !primes.contains(&p) && !skip_list.contains(&p) {
                        primes.push(p);
                        break;
                    } else {
                        upper_bound = p;
                    }
                }
                None => {
                    return Err(Error::InvalidParameter(format!(
                        "not enough {s} bits primes congruent to 1 mod {}",
                        2 * polynomial_degree
                    )));
                }
            }
        }
    }
    Ok(primes)
}

/// Finds largest prime < upper_bound such that prime % modulo == 1 and prime has exactly `num_bits` bits
pub fn generate_prime(num_bits: usize, modulo: u64, upper_bound: u64) -> Option<u64> {
    let leading_zeros = (64 - num_bits) as u32;

    if upper_bound <= modulo {
        return None;
    }

    let mut tentative_prime = upper_bound - 1;
    while tentative_prime % modulo != 1 && tentative_prime.leading_zeros() == leading_zeros {
        tentative_prime -= 1;
    }

    while !probably_prime(&BigUint::from(tentative_prime), 0)
        && tentative_prime.leading_zeros() == leading_zeros
        && tentative_prime > modulo
    {
        tentative_prime -= modulo;
    }

    if tentative_prime % modulo == 1
        && probably_prime(&BigUint::from(tentative_prime), 0)
        && tentative_prime.leading_zeros() == leading_zeros
    {
        Some(tentative_prime)
    } else {
        None
    }
}
