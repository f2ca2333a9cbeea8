//! Gateway scenarios over the in-memory bus and loopback HTTP.

#[cfg(test)]
mod support;

#[cfg(test)]
mod bus_flows;
#[cfg(test)]
mod races;
#[cfg(test)]
mod rest_flows;
