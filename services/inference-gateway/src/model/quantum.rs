//! Statevector evaluation of the generator's variational circuit.
//!
//! Circuit: `RX(x_i)` angle embedding on each wire, then strongly entangling
//! layers (a general `Rot` on every wire followed by a ring of CNOTs whose
//! target offset grows with the layer index), measured as `<Z_i>` per wire.
//! Wire 0 is the most significant bit of the basis-state index.

use super::InferenceError;
use ndarray::{Array1, Array3, ArrayView1};
use num_complex::Complex64;

pub const N_QUBITS: usize = 4;
/// Parameters per `Rot` gate: (phi, theta, omega).
pub const ROT_PARAMS: usize = 3;

type Gate = [[Complex64; 2]; 2];

#[derive(Debug, Clone)]
pub struct QuantumLayer {
    /// `[layers, N_QUBITS, ROT_PARAMS]`.
    weights: Array3<f32>,
}

impl QuantumLayer {
    pub fn new(weights: Array3<f32>) -> Result<Self, InferenceError> {
        let (layers, wires, params) = weights.dim();
        if layers == 0 || wires != N_QUBITS || params != ROT_PARAMS {
            return Err(InferenceError::shape("quantum weights", vec![layers.max(1), N_QUBITS, ROT_PARAMS], vec![layers, wires, params]));
        }
        Ok(Self { weights })
    }

    pub fn layers(&self) -> usize { self.weights.dim().0 }

    pub fn forward(&self, inputs: ArrayView1<'_, f32>) -> Result<Array1<f32>, InferenceError> {
        if inputs.len() != N_QUBITS {
            return Err(InferenceError::shape("quantum input", vec![N_QUBITS], vec![inputs.len()]));
        }
        let mut state = StateVector::new(N_QUBITS);
        for (wire, x) in inputs.iter().enumerate() {
            state.apply(wire, &rx(f64::from(*x)));
        }
        for layer in 0..self.layers() {
            for wire in 0..N_QUBITS {
                let w = |p: usize| f64::from(self.weights[[layer, wire, p]]);
                state.apply(wire, &rot(w(0), w(1), w(2)));
            }
            let range = layer % (N_QUBITS - 1) + 1;
            for wire in 0..N_QUBITS {
                state.cnot(wire, (wire + range) % N_QUBITS);
            }
        }
        Ok((0..N_QUBITS).map(|wire| state.expval_z(wire) as f32).collect())
    }
}

#[derive(Debug, Clone)]
struct StateVector {
    qubits: usize,
    amps: Vec<Complex64>,
}

impl StateVector {
    /// `|0...0>`.
    fn new(qubits: usize) -> Self {
        let mut amps = vec![Complex64::new(0.0, 0.0); 1 << qubits];
        amps[0] = Complex64::new(1.0, 0.0);
        Self { qubits, amps }
    }

    fn mask(&self, wire: usize) -> usize { 1 << (self.qubits - 1 - wire) }

    fn apply(&mut self, wire: usize, gate: &Gate) {
        let mask = self.mask(wire);
        for i in 0..self.amps.len() {
            if i & mask != 0 { continue; }
            let j = i | mask;
            let (a, b) = (self.amps[i], self.amps[j]);
            self.amps[i] = gate[0][0] * a + gate[0][1] * b;
            self.amps[j] = gate[1][0] * a + gate[1][1] * b;
        }
    }

    fn cnot(&mut self, control: usize, target: usize) {
        let (cm, tm) = (self.mask(control), self.mask(target));
        for i in 0..self.amps.len() {
            if i & cm != 0 && i & tm == 0 {
                self.amps.swap(i, i | tm);
            }
        }
    }

    fn expval_z(&self, wire: usize) -> f64 {
        let mask = self.mask(wire);
        self.amps.iter().enumerate().map(|(i, a)| if i & mask == 0 { a.norm_sqr() } else { -a.norm_sqr() }).sum()
    }

    #[cfg(test)]
    fn norm(&self) -> f64 { self.amps.iter().map(|a| a.norm_sqr()).sum() }
}

fn rx(theta: f64) -> Gate {
    let (s, c) = (theta / 2.0).sin_cos();
    [[Complex64::new(c, 0.0), Complex64::new(0.0, -s)], [Complex64::new(0.0, -s), Complex64::new(c, 0.0)]]
}

/// `RZ(omega) * RY(theta) * RZ(phi)`.
fn rot(phi: f64, theta: f64, omega: f64) -> Gate {
    let (s, c) = (theta / 2.0).sin_cos();
    let sum = (phi + omega) / 2.0;
    let diff = (phi - omega) / 2.0;
    [
        [Complex64::from_polar(c, -sum), -Complex64::from_polar(s, diff)],
        [Complex64::from_polar(s, -diff), Complex64::from_polar(c, sum)],
    ]
}
