//! Physical constants in CGS units.

/// Gravitational constant (cm^3 g^-1 s^-2).
pub const G: f64 = 6.674e-8;

/// Boltzmann constant (erg K^-1).
pub const K_B: f64 = 1.380649e-16;

/// Boltzmann constant in keV per kelvin.
pub const K_B_KEV: f64 = 8.617333262e-8;

/// Proton mass (g).
pub const M_P: f64 = 1.67262192369e-24;

/// Solar mass (g).
pub const M_SOL: f64 = 1.98892e33;

/// Kiloparsec (cm).
pub const KPC: f64 = 3.0856775814913673e21;

/// Kilometre (cm).
pub const KM: f64 = 1.0e5;

/// Gigayear (s).
pub const GYR: f64 = 3.15576e16;

/// One kilo-electronvolt (erg).
pub const KEV: f64 = 1.602176634e-9;

/// Adiabatic index of a monatomic ideal gas.
pub const GAMMA: f64 = 5.0 / 3.0;

/// Default mean molecular weight of the fully ionized intracluster medium.
pub const MU: f64 = 0.6;

/// MOND reference acceleration a0 (cm s^-2).
pub const A0: f64 = 1.2e-8;
