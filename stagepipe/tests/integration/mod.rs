mod pipeline_test;
mod stages_test;
