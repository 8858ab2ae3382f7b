pub(crate) mod resolved_principal;
