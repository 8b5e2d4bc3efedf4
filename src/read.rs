// read.rs
use ndarray::{Array1, Array2};

use crate::{Array4, MoData};

/// Read the MO integral file produced by the external integral backend. The
/// file carries the one-electron integrals h_{pq}, the two-electron integrals
/// (pq|rs) with the permutational symmetry already expanded to the full
/// 4-index array, the nuclear repulsion energy and the electron counts.
/// # Arguments
///     `path`: str, file path to the HDF5 integral file.
pub fn read_integrals(path: &str) -> MoData {
    let file = hdf5::File::open(path).unwrap();

    let h1: Array2<f64> = file.dataset("h1").unwrap().read_2d().unwrap();
    let eri: Array4 = file.dataset("eri").unwrap().read().unwrap();
    let enuc: f64 = file.dataset("enuc").unwrap().read_scalar().unwrap();
    let nelec: Array1<i64> = file.dataset("nelec").unwrap().read_1d().unwrap();

    let norb = h1.nrows();
    if h1.ncols() != norb {
        eprintln!("One-electron integral array must be square, got {:?}", h1.dim());
        std::process::exit(1);
    }
    if eri.dim() != (norb, norb, norb, norb) {
        eprintln!("Two-electron integral array must be norb^4, got {:?}", eri.dim());
        std::process::exit(1);
    }
    if norb > 64 {
        eprintln!("At most 64 orbitals fit the determinant encoding, got {norb}");
        std::process::exit(1);
    }
    if nelec.len() != 2 {
        eprintln!("nelec must hold the alpha and beta electron counts, got {} entries", nelec.len());
        std::process::exit(1);
    }
    let (na, nb) = (nelec[0], nelec[1]);
    if na < 0 || nb < 0 || na as usize > norb || nb as usize > norb {
        eprintln!("Electron counts ({na}, {nb}) incompatible with {norb} orbitals");
        std::process::exit(1);
    }

    MoData { h1, eri, enuc, norb, nelec: (na as usize, nb as usize) }
}
