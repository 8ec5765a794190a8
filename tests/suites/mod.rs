mod passthrough;
mod routing;
mod transactions;
