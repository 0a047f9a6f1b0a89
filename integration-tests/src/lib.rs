//! Scénarios bout-en-bout: voir `tests/`.
