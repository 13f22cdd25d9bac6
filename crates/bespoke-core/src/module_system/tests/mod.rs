pub(crate) mod support;

mod registry_tests;
