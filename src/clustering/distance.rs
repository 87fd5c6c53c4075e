use ndarray::{Array2, ArrayView1};

pub fn euclidean(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Symmetric `n x n` matrix of Euclidean distances between rows.
pub fn pairwise(matrix: &Array2<f64>) -> Array2<f64> {
    let n = matrix.nrows();
    let mut dist = Array2::zeros((n, n));
    for i in 0..n {
        for j in (i + 1)..n {
            let d = euclidean(matrix.row(i), matrix.row(j));
            dist[[i, j]] = d;
            dist[[j, i]] = d;
        }
    }
    dist
}
