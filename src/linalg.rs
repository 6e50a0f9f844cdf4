/**
 * RecoReco
 * Copyright (C) 2018 Sebastian Schelter
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program. If not, see <http://www.gnu.org/licenses/>.
 */

// Small dense kernels for the `k x k` normal equations of ALS. Matrices are row-major slices,
// `k` is the number of latent factors and typically well below a hundred.

#[inline(always)]
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[inline(always)]
pub fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

/// `target += scale * x`
#[inline(always)]
pub fn add_scaled(target: &mut [f64], x: &[f64], scale: f64) {
    for (value, x_value) in target.iter_mut().zip(x.iter()) {
        *value += scale * x_value;
    }
}

/// `matrix += scale * x xᵀ`, only the lower triangle is touched as that is all the Cholesky
/// factorization below reads.
#[inline(always)]
pub fn add_scaled_outer_product(matrix: &mut [f64], x: &[f64], scale: f64, k: usize) {
    for a in 0..k {
        let scaled_x_a = scale * x[a];
        let row = &mut matrix[a * k..a * k + a + 1];
        for (b, value) in row.iter_mut().enumerate() {
            *value += scaled_x_a * x[b];
        }
    }
}

/// `matrix += value * I`
#[inline(always)]
pub fn add_to_diagonal(matrix: &mut [f64], value: f64, k: usize) {
    for a in 0..k {
        matrix[a * k + a] += value;
    }
}

/// Solves `A x = b` for a symmetric positive semi-definite `A` via its Cholesky factorization
/// `A = L Lᵀ`. Only the lower triangle of `A` is read, and it is overwritten with `L`. On success
/// `b` holds the solution.
///
/// A pivot which is not larger than `min_pivot` means `A` is numerically singular. Without
/// `deflate` we give up and return false, in which case the contents of both slices are
/// unspecified. With `deflate`, the direction of that pivot is dropped from the system: its
/// column of `L` and its component of the solution are set to zero. This is exact whenever `b`
/// lies in the range of `A`, which holds for the ALS normal equations. Non-finite pivots always
/// fail.
pub fn cholesky_solve(
    a: &mut [f64],
    b: &mut [f64],
    k: usize,
    min_pivot: f64,
    deflate: bool,
) -> bool {

    for j in 0..k {

        let mut diagonal = a[j * k + j];
        for p in 0..j {
            diagonal -= a[j * k + p] * a[j * k + p];
        }

        if !diagonal.is_finite() {
            return false;
        }

        if !(diagonal > min_pivot) {
            if !deflate {
                return false;
            }

            // A zero on the diagonal of L marks the dropped direction
            a[j * k + j] = 0.0;
            for i in (j + 1)..k {
                a[i * k + j] = 0.0;
            }
            continue;
        }

        let l_jj = diagonal.sqrt();
        a[j * k + j] = l_jj;

        for i in (j + 1)..k {
            let mut value = a[i * k + j];
            for p in 0..j {
                value -= a[i * k + p] * a[j * k + p];
            }
            a[i * k + j] = value / l_jj;
        }
    }

    // Forward substitution L y = b
    for i in 0..k {
        let l_ii = a[i * k + i];
        if l_ii == 0.0 {
            b[i] = 0.0;
            continue;
        }

        let mut value = b[i];
        for p in 0..i {
            value -= a[i * k + p] * b[p];
        }
        b[i] = value / l_ii;
    }

    // Backward substitution Lᵀ x = y
    for i in (0..k).rev() {
        let l_ii = a[i * k + i];
        if l_ii == 0.0 {
            b[i] = 0.0;
            continue;
        }

        let mut value = b[i];
        for p in (i + 1)..k {
            value -= a[p * k + i] * b[p];
        }
        b[i] = value / l_ii;
    }

    true
}

#[cfg(test)]
mod tests {

    use crate::linalg;

    fn close_enough_to(value: f64, expected: f64) -> bool {
        (value - expected).abs() < 1e-9
    }

    #[test]
    fn solves_spd_system() {

        let mut a = vec![
            4.0, 12.0, -16.0,
            12.0, 37.0, -43.0,
            -16.0, -43.0, 98.0,
        ];
        // x = [1, 2, 3]
        let mut b = vec![-20.0, -43.0, 192.0];

        assert!(linalg::cholesky_solve(&mut a, &mut b, 3, 0.0, false));

        assert!(close_enough_to(b[0], 1.0));
        assert!(close_enough_to(b[1], 2.0));
        assert!(close_enough_to(b[2], 3.0));
    }

    #[test]
    fn detects_singular_system() {

        let mut a = vec![
            1.0, 2.0,
            2.0, 4.0,
        ];
        let mut b = vec![1.0, 2.0];

        assert!(!linalg::cholesky_solve(&mut a, &mut b, 2, 1e-10, false));
    }

    #[test]
    fn deflates_singular_direction() {

        // Rank one, b = A [1, 0]
        let mut a = vec![
            1.0, 2.0,
            2.0, 4.0,
        ];
        let mut b = vec![1.0, 2.0];

        assert!(linalg::cholesky_solve(&mut a, &mut b, 2, 1e-10, true));

        assert!(close_enough_to(b[0], 1.0));
        assert_eq!(b[1], 0.0);

        let mut a = vec![
            std::f64::INFINITY, 0.0,
            0.0, 1.0,
        ];
        let mut b = vec![1.0, 1.0];

        assert!(!linalg::cholesky_solve(&mut a, &mut b, 2, 1e-10, true));
    }

    #[test]
    fn outer_product_fills_lower_triangle() {

        let mut matrix = vec![0.0; 4];
        linalg::add_scaled_outer_product(&mut matrix, &[1.0, 2.0], 3.0, 2);
        linalg::add_to_diagonal(&mut matrix, 0.5, 2);

        assert_eq!(matrix, vec![3.5, 0.0, 6.0, 12.5]);
    }

    #[test]
    fn vector_helpers() {

        let mut target = vec![1.0, 1.0];
        linalg::add_scaled(&mut target, &[2.0, -1.0], 0.5);

        assert_eq!(target, vec![2.0, 0.5]);
        assert_eq!(linalg::dot(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]), 32.0);
        assert!(close_enough_to(linalg::norm(&[3.0, 4.0]), 5.0));
    }
}
