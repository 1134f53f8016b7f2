pub mod approval;
pub mod identity;
pub mod incident;
pub mod reference;
