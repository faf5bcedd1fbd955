mod propagation_tests;
