//! Scenario tests for the relay with mock collaborators.
