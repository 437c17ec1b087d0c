// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Special functions and distribution tails used by the hypothesis tests.

const LOG_2PI: f64 = 1.8378770664093453;
const LANCZOS_G: f64 = 7.0;
const LANCZOS_COEFFICIENTS: [f64; 9] = [
    0.999_999_999_999_809_9,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_1,
    -176.615_029_162_140_6,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_572e-6,
    1.505_632_735_149_311_7e-7,
];

const MAX_ITERATIONS: usize = 500;
const EPSILON: f64 = 1.0e-15;
const FLOOR: f64 = 1.0e-300;

// Acklam's rational approximation to the normal quantile.
const PPF_A: [f64; 6] = [
    -3.969_683_028_665_376e1,
    2.209_460_984_245_205e2,
    -2.759_285_104_469_687e2,
    1.383_577_518_672_690e2,
    -3.066_479_806_614_716e1,
    2.506_628_277_459_239,
];
const PPF_B: [f64; 5] = [
    -5.447_609_879_822_406e1,
    1.615_858_368_580_409e2,
    -1.556_989_798_598_866e2,
    6.680_131_188_771_972e1,
    -1.328_068_155_288_572e1,
];
const PPF_C: [f64; 6] = [
    -7.784_894_002_430_293e-3,
    -3.223_964_580_411_365e-1,
    -2.400_758_277_161_838,
    -2.549_732_539_343_734,
    4.374_664_141_464_968,
    2.938_163_982_698_783,
];
const PPF_D: [f64; 4] = [
    7.784_695_709_041_462e-3,
    3.224_671_290_700_398e-1,
    2.445_134_137_142_996,
    3.754_408_661_907_416,
];
const PPF_LOW: f64 = 0.02425;

/// Natural log of the gamma function for finite `z > 0`.
pub fn ln_gamma(z: f64) -> f64 {
    debug_assert!(
        z.is_finite() && z > 0.0,
        "ln_gamma requires z > 0 and finite"
    );

    // ln Γ(z) = -ln(z) + O(z) as z -> 0+.
    if z < 1e-8 {
        return -z.ln();
    }

    if z < 0.5 {
        let sin_term = (std::f64::consts::PI * z).sin().abs();
        return std::f64::consts::PI.ln() - sin_term.ln() - ln_gamma(1.0 - z);
    }

    let shifted = z - 1.0;
    let mut x = LANCZOS_COEFFICIENTS[0];
    for (idx, coefficient) in LANCZOS_COEFFICIENTS.iter().copied().enumerate().skip(1) {
        x += coefficient / (shifted + idx as f64);
    }

    let t = shifted + LANCZOS_G + 0.5;
    0.5 * LOG_2PI + (shifted + 0.5) * t.ln() - t + x.ln()
}

/// ln(n choose k).
pub fn ln_binomial(n: u64, k: u64) -> f64 {
    debug_assert!(k <= n);
    ln_gamma(n as f64 + 1.0) - ln_gamma(k as f64 + 1.0) - ln_gamma((n - k) as f64 + 1.0)
}

/// Regularized upper incomplete gamma Q(a, x).
pub fn gamma_q(a: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 1.0;
    }
    if x < a + 1.0 {
        (1.0 - gamma_series(a, x)).clamp(0.0, 1.0)
    } else {
        gamma_continued_fraction(a, x).clamp(0.0, 1.0)
    }
}

/// Regularized lower incomplete gamma P(a, x).
pub fn gamma_p(a: f64, x: f64) -> f64 {
    1.0 - gamma_q(a, x)
}

fn gamma_series(a: f64, x: f64) -> f64 {
    let mut ap = a;
    let mut sum = 1.0 / a;
    let mut delta = sum;
    for _ in 0..MAX_ITERATIONS {
        ap += 1.0;
        delta *= x / ap;
        sum += delta;
        if delta.abs() < sum.abs() * EPSILON {
            break;
        }
    }
    sum * (-x + a * x.ln() - ln_gamma(a)).exp()
}

fn gamma_continued_fraction(a: f64, x: f64) -> f64 {
    let mut b = x + 1.0 - a;
    let mut c = 1.0 / FLOOR;
    let mut d = 1.0 / b;
    let mut h = d;
    for i in 1..MAX_ITERATIONS {
        let an = -(i as f64) * (i as f64 - a);
        b += 2.0;
        d = an * d + b;
        if d.abs() < FLOOR {
            d = FLOOR;
        }
        c = b + an / c;
        if c.abs() < FLOOR {
            c = FLOOR;
        }
        d = 1.0 / d;
        let delta = d * c;
        h *= delta;
        if (delta - 1.0).abs() < EPSILON {
            break;
        }
    }
    (-x + a * x.ln() - ln_gamma(a)).exp() * h
}

/// Regularized incomplete beta I_x(a, b).
pub fn beta_inc(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }

    let ln_front =
        ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln();
    let front = ln_front.exp();
    let value = if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(a, b, x) / a
    } else {
        1.0 - front * beta_continued_fraction(b, a, 1.0 - x) / b
    };
    value.clamp(0.0, 1.0)
}

fn beta_continued_fraction(a: f64, b: f64, x: f64) -> f64 {
    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;
    let mut c = 1.0;
    let mut d = 1.0 - qab * x / qap;
    if d.abs() < FLOOR {
        d = FLOOR;
    }
    d = 1.0 / d;
    let mut h = d;

    for m in 1..=MAX_ITERATIONS {
        let m = m as f64;
        let m2 = 2.0 * m;

        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 + aa * d;
        if d.abs() < FLOOR {
            d = FLOOR;
        }
        c = 1.0 + aa / c;
        if c.abs() < FLOOR {
            c = FLOOR;
        }
        d = 1.0 / d;
        h *= d * c;

        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 + aa * d;
        if d.abs() < FLOOR {
            d = FLOOR;
        }
        c = 1.0 + aa / c;
        if c.abs() < FLOOR {
            c = FLOOR;
        }
        d = 1.0 / d;
        let delta = d * c;
        h *= delta;
        if (delta - 1.0).abs() < EPSILON {
            break;
        }
    }
    h
}

/// Complementary error function.
pub fn erfc(x: f64) -> f64 {
    if x.is_nan() {
        return f64::NAN;
    }
    let q = gamma_q(0.5, x * x);
    if x >= 0.0 { q } else { 2.0 - q }
}

pub fn normal_cdf(z: f64) -> f64 {
    0.5 * erfc(-z / std::f64::consts::SQRT_2)
}

/// Upper tail of the standard normal.
pub fn normal_sf(z: f64) -> f64 {
    0.5 * erfc(z / std::f64::consts::SQRT_2)
}

/// Standard normal quantile for `p` in (0, 1), refined with one Halley step.
pub fn normal_ppf(p: f64) -> f64 {
    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }

    let x = if p < PPF_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        tail_ratio(q)
    } else if p <= 1.0 - PPF_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((PPF_A[0] * r + PPF_A[1]) * r + PPF_A[2]) * r + PPF_A[3]) * r + PPF_A[4]) * r
            + PPF_A[5])
            * q
            / (((((PPF_B[0] * r + PPF_B[1]) * r + PPF_B[2]) * r + PPF_B[3]) * r + PPF_B[4]) * r
                + 1.0)
    } else {
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        -tail_ratio(q)
    };

    let e = normal_cdf(x) - p;
    let u = e * (2.0 * std::f64::consts::PI).sqrt() * (0.5 * x * x).exp();
    x - u / (1.0 + 0.5 * x * u)
}

fn tail_ratio(q: f64) -> f64 {
    (((((PPF_C[0] * q + PPF_C[1]) * q + PPF_C[2]) * q + PPF_C[3]) * q + PPF_C[4]) * q + PPF_C[5])
        / ((((PPF_D[0] * q + PPF_D[1]) * q + PPF_D[2]) * q + PPF_D[3]) * q + 1.0)
}

/// Upper tail of the chi-square distribution with `df` degrees of freedom.
pub fn chi_square_sf(x: f64, df: f64) -> f64 {
    if x <= 0.0 {
        return 1.0;
    }
    gamma_q(0.5 * df, 0.5 * x)
}

/// Upper tail of the F distribution with (`d1`, `d2`) degrees of freedom.
pub fn f_sf(f: f64, d1: f64, d2: f64) -> f64 {
    if f <= 0.0 {
        return 1.0;
    }
    if f.is_infinite() {
        return 0.0;
    }
    beta_inc(0.5 * d2, 0.5 * d1, d2 / (d2 + d1 * f))
}

/// Two-sided p-value of Student's t with `df` degrees of freedom.
pub fn student_t_two_sided(t: f64, df: f64) -> f64 {
    if t.is_infinite() {
        return 0.0;
    }
    beta_inc(0.5 * df, 0.5, df / (df + t * t))
}

#[cfg(test)]
mod tests {
    use super::{
        beta_inc, chi_square_sf, erfc, f_sf, gamma_p, gamma_q, ln_binomial, ln_gamma, normal_cdf,
        normal_ppf, normal_sf, student_t_two_sided,
    };

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tol={tol}"
        );
    }

    #[test]
    fn ln_gamma_matches_known_values() {
        assert_close(ln_gamma(1.0), 0.0, 1e-14);
        assert_close(ln_gamma(0.5), 0.5 * std::f64::consts::PI.ln(), 1e-12);
        assert_close(ln_gamma(5.0), 24.0_f64.ln(), 1e-12);
        assert_close(ln_binomial(10, 3), 120.0_f64.ln(), 1e-10);
    }

    #[test]
    fn incomplete_gamma_special_cases() {
        for x in [0.1, 1.0, 2.5, 10.0] {
            assert_close(gamma_q(1.0, x), (-x).exp(), 1e-12);
            assert_close(gamma_p(1.0, x), 1.0 - (-x).exp(), 1e-12);
        }
        assert_eq!(gamma_q(2.0, 0.0), 1.0);
    }

    #[test]
    fn incomplete_beta_special_cases() {
        for x in [0.1, 0.5, 0.9] {
            assert_close(beta_inc(1.0, 1.0, x), x, 1e-12);
            assert_close(beta_inc(2.0, 1.0, x), x * x, 1e-12);
        }
        assert_close(beta_inc(3.0, 3.0, 0.5), 0.5, 1e-12);
    }

    #[test]
    fn normal_functions_match_reference_values() {
        assert_close(normal_cdf(0.0), 0.5, 1e-15);
        assert_close(normal_cdf(1.96), 0.975_002_104_851_779_5, 1e-12);
        assert_close(normal_sf(3.0), 0.001_349_898_031_630_094_6, 1e-14);
        assert_close(erfc(-1.0), 1.842_700_792_949_714_9, 1e-12);
        assert_close(normal_ppf(0.975), 1.959_963_984_540_054, 1e-9);
        assert_close(normal_ppf(0.001), -3.090_232_306_167_813_5, 1e-9);
        assert_close(normal_ppf(0.5), 0.0, 1e-12);
    }

    #[test]
    fn distribution_tails_match_critical_values() {
        assert_close(chi_square_sf(3.841_458_820_694_124, 1.0), 0.05, 1e-9);
        assert_close(chi_square_sf(5.991_464_547_107_979, 2.0), 0.05, 1e-9);
        assert_close(f_sf(4.964_602_743_730_711, 1.0, 10.0), 0.05, 1e-9);
        assert_close(student_t_two_sided(2.228_138_851_986_273, 10.0), 0.05, 1e-9);
        assert_eq!(f_sf(0.0, 2.0, 5.0), 1.0);
        assert_eq!(chi_square_sf(-1.0, 3.0), 1.0);
    }
}
