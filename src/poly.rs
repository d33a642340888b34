use crate::backends::error::ScalarError;
use crate::points::KeyPoint;
use crate::points::KeyPointProjective;
use crate::traits::Projective;
use crate::traits::ScalarField;
use crate::traits::Scheme;

use rand_core::RngCore;
use std::collections::BTreeSet;

/// Index is an alias to designate the index of a group member. Indices start
/// at 1 and a member's shares are evaluations of polynomials at its index,
/// so index 0 (the secret itself) is never handed out.
pub type Index = u32;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum PolyError {
    #[error("not enough shares: needed {needed}, received {received}")]
    NotEnoughShares { needed: usize, received: usize },
    #[error("duplicated share index {0}")]
    DuplicateIndex(Index),
    #[error("share index 0 is reserved for the secret")]
    ZeroIndex,
    #[error("{0}")]
    Scalar(#[from] ScalarError),
}

pub struct PriShare<S: Scheme> {
    pub i: Index,
    pub v: S::Scalar,
}

impl<S: Scheme> PriShare<S> {
    pub fn new(i: Index, v: S::Scalar) -> Self {
        Self { i, v }
    }

    pub fn index(&self) -> Index {
        self.i
    }

    pub fn value(&self) -> &S::Scalar {
        &self.v
    }
}

impl<S: Scheme> Clone for PriShare<S> {
    fn clone(&self) -> Self {
        Self { i: self.i, v: self.v }
    }
}

impl<S: Scheme> std::fmt::Debug for PriShare<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // value is secret
        f.debug_struct("PriShare").field("i", &self.i).finish()
    }
}

/// Private polynomial `f(x) = c_0 + c_1 x + ... + c_t x^t`.
pub struct PriPoly<S: Scheme> {
    coeffs: Vec<S::Scalar>,
}

impl<S: Scheme> PriPoly<S> {
    /// Samples a random polynomial of the given degree, that is `degree + 1`
    /// coefficients.
    pub fn new<R: RngCore>(degree: usize, rng: &mut R) -> Self {
        let coeffs = (0..=degree).map(|_| S::Scalar::random(rng)).collect();

        Self { coeffs }
    }

    pub fn eval(&self, i: Index) -> PriShare<S> {
        debug_assert!(i != 0, "evaluation at 0 reveals the secret");
        let xi = S::Scalar::from_u64(i.into());
        let mut v = S::Scalar::zero();
        for c in self.coeffs.iter().rev() {
            v *= &xi;
            v += c;
        }

        PriShare { i, v }
    }

    pub fn commit(&self) -> PubPoly<S> {
        let commits = self.coeffs.iter().map(S::sk_to_pk).collect();

        PubPoly { commits }
    }

    pub fn secret(&self) -> &S::Scalar {
        &self.coeffs[0]
    }

    pub fn coeffs(&self) -> &[S::Scalar] {
        &self.coeffs
    }

    pub fn degree(&self) -> usize {
        self.coeffs.len() - 1
    }
}

/// Public polynomial, i.e. the coefficients of a [`PriPoly`] lifted to the
/// key group: `A_k = g * c_k`.
#[derive(Debug, Clone, PartialEq)]
pub struct PubPoly<S: Scheme> {
    pub commits: Vec<KeyPoint<S>>,
}

#[derive(Debug)]
pub struct PubShare<S: Scheme> {
    pub i: Index,
    pub v: KeyPoint<S>,
}

impl<S: Scheme> PubShare<S> {
    pub fn value(&self) -> &KeyPoint<S> {
        &self.v
    }
}

impl<S: Scheme> PubPoly<S> {
    pub fn eval(&self, i: Index) -> PubShare<S> {
        PubShare {
            i,
            v: eval_commitments::<S>(&self.commits, i).into(),
        }
    }

    /// Public key of the polynomial owner, `g * c_0`.
    pub fn public_key(&self) -> Option<&KeyPoint<S>> {
        self.commits.first()
    }

    pub fn degree(&self) -> usize {
        self.commits.len().saturating_sub(1)
    }
}

/// Computes `Σ_k points[k] * i^k` with Horner's method.
pub fn eval_commitments<S: Scheme>(points: &[KeyPoint<S>], i: Index) -> KeyPointProjective<S> {
    let xi = S::Scalar::from_u64(i.into());
    let mut v = KeyPointProjective::<S>::identity();
    for p in points.iter().rev() {
        v *= &xi;
        v += p;
    }

    v
}

/// Lagrange basis coefficients evaluated at `x = 0` for the given set of
/// indices: `λ_i = Π_{j≠i} x_j / (x_j - x_i)`. The output is aligned with
/// `indices`.
pub fn lagrange_coefficients<S: Scheme>(indices: &[Index]) -> Result<Vec<S::Scalar>, PolyError> {
    let mut seen = BTreeSet::new();
    for i in indices {
        if *i == 0 {
            return Err(PolyError::ZeroIndex);
        }
        if !seen.insert(*i) {
            return Err(PolyError::DuplicateIndex(*i));
        }
    }

    let xs: Vec<S::Scalar> = indices
        .iter()
        .map(|i| S::Scalar::from_u64((*i).into()))
        .collect();

    let mut coefficients = Vec::with_capacity(xs.len());
    for (i, xi) in xs.iter().enumerate() {
        let mut num = S::Scalar::one();
        let mut den = S::Scalar::one();
        for (j, xj) in xs.iter().enumerate() {
            if i == j {
                continue;
            }
            num *= xj;
            let mut tmp = *xj;
            tmp -= xi;
            den *= &tmp;
        }
        num *= &den.invert()?;
        coefficients.push(num);
    }

    Ok(coefficients)
}

/// Recovers `f(0)` from at least `t` shares of a polynomial of degree `t - 1`.
/// Shares are sorted by index and exactly the `t` lowest ones are used, so
/// the result does not depend on the input order.
pub fn recover_secret<S: Scheme>(shares: &[PriShare<S>], t: usize) -> Result<S::Scalar, PolyError> {
    if t == 0 || shares.len() < t {
        return Err(PolyError::NotEnoughShares {
            needed: t,
            received: shares.len(),
        });
    }
    let mut sorted: Vec<&PriShare<S>> = shares.iter().collect();
    sorted.sort_by_key(|s| s.i);
    sorted.truncate(t);

    let indices: Vec<Index> = sorted.iter().map(|s| s.i).collect();
    let lambdas = lagrange_coefficients::<S>(&indices)?;

    let mut acc = S::Scalar::zero();
    for (share, lambda) in sorted.iter().zip(lambdas.iter()) {
        acc += &(share.v * lambda);
    }

    Ok(acc)
}
