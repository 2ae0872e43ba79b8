//! # Market Data
//!
//! $$
//! \mathcal U = (a_1,\dots,a_N),\qquad P_i = \{(t_k, p_{k,i})\}_{k=0}^{T}
//! $$
//!
//! Read-only inputs of a run: the ordered asset universe and one aligned
//! price series per asset. Fetching and gap-filling happen upstream.

pub mod prices;
pub mod universe;

pub use prices::PriceData;
pub use prices::PricePoint;
pub use prices::PriceSeries;
pub use universe::AssetUniverse;
